//! 重试策略

use std::time::Duration;

/// 读操作默认重试次数（不含首次尝试）
pub const DEFAULT_READ_RETRIES: u32 = 3;
/// 写操作默认重试次数（不含首次尝试）
pub const DEFAULT_WRITE_RETRIES: u32 = 1;
/// 默认退避基数
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// 有界重试 + 平方退避。
///
/// 第 n 次重试（n 从 1 开始）前等待 `base_delay * n²`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn for_reads(base_delay: Duration) -> Self {
        Self::new(DEFAULT_READ_RETRIES, base_delay)
    }

    pub fn for_writes(base_delay: Duration) -> Self {
        Self::new(DEFAULT_WRITE_RETRIES, base_delay)
    }

    /// 第 `retry` 次重试前的等待时长；超过上限返回 None。
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        Some(self.base_delay.saturating_mul(retry.saturating_mul(retry)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_reads(DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_quadratically() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(900)));
        assert_eq!(policy.delay_for(4), None);
    }

    #[test]
    fn write_policy_retries_once() {
        let policy = RetryPolicy::for_writes(Duration::from_millis(50));
        assert!(policy.delay_for(1).is_some());
        assert!(policy.delay_for(2).is_none());
    }

    #[test]
    fn zero_is_not_a_retry() {
        assert_eq!(RetryPolicy::default().delay_for(0), None);
    }
}
