//! GLT 心跳状态
//!
//! 设备的远程控制看门狗需要周期性写入 PIN（寄存器 8300）。这里只保存状态，
//! 实际写入由会话管理器和客户端完成。

use std::time::Duration;
use tokio::time::Instant;

/// 一次 `heartbeat` 调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// PIN 已写入设备
    Sent,
    /// 节流窗口内重复发送同一 PIN，未产生线上写入
    Throttled,
}

/// 心跳状态：记住的 PIN 与最近一次成功写入
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    pin: Option<u16>,
    last_sent: Option<(u16, Instant)>,
    throttle: bool,
    min_interval: Duration,
}

impl HeartbeatState {
    pub fn new(throttle: bool, min_interval: Duration) -> Self {
        Self {
            pin: None,
            last_sent: None,
            throttle,
            min_interval,
        }
    }

    /// 当前记住的 PIN。
    pub fn pin(&self) -> Option<u16> {
        self.pin
    }

    pub fn remember(&mut self, pin: u16) {
        self.pin = Some(pin);
    }

    /// 最近一次成功写入的时间。
    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent.map(|(_, at)| at)
    }

    pub fn mark_sent(&mut self, pin: u16, at: Instant) {
        self.last_sent = Some((pin, at));
    }

    /// 节流判断：仅当开启节流、PIN 未变化且距上次成功写入不足最小间隔时抑制。
    pub fn should_throttle(&self, pin: u16, now: Instant) -> bool {
        if !self.throttle {
            return false;
        }
        match self.last_sent {
            Some((sent_pin, at)) => sent_pin == pin && now.duration_since(at) < self.min_interval,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_disabled_never_suppresses() {
        let now = Instant::now();
        let mut state = HeartbeatState::new(false, Duration::from_secs(10));
        state.mark_sent(1234, now);
        assert!(!state.should_throttle(1234, now));
    }

    #[test]
    fn throttle_suppresses_same_pin_inside_window() {
        let now = Instant::now();
        let mut state = HeartbeatState::new(true, Duration::from_secs(10));
        assert!(!state.should_throttle(1234, now));

        state.mark_sent(1234, now);
        assert!(state.should_throttle(1234, now + Duration::from_secs(9)));
        assert!(!state.should_throttle(1234, now + Duration::from_secs(10)));
        assert!(!state.should_throttle(4321, now + Duration::from_secs(1)));
    }

    #[test]
    fn remembers_pin() {
        let mut state = HeartbeatState::new(true, Duration::from_secs(10));
        assert_eq!(state.pin(), None);
        state.remember(42);
        assert_eq!(state.pin(), Some(42));
        assert_eq!(state.last_sent_at(), None);
    }
}
