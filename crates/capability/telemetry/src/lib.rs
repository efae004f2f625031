//! 追踪初始化、轮询周期 ID 与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connects: u64,
    pub connect_failures: u64,
    pub rearms: u64,
    pub read_requests: u64,
    pub read_success: u64,
    pub read_failure: u64,
    pub transient_failures: u64,
    pub retries: u64,
    pub device_exceptions: u64,
    pub write_success: u64,
    pub write_failure: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_throttled: u64,
    pub read_latency_ms_total: u64,
    pub read_latency_ms_count: u64,
}

/// 客户端计数器。
pub struct TelemetryMetrics {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    rearms: AtomicU64,
    read_requests: AtomicU64,
    read_success: AtomicU64,
    read_failure: AtomicU64,
    transient_failures: AtomicU64,
    retries: AtomicU64,
    device_exceptions: AtomicU64,
    write_success: AtomicU64,
    write_failure: AtomicU64,
    heartbeats_sent: AtomicU64,
    heartbeats_throttled: AtomicU64,
    read_latency_ms_total: AtomicU64,
    read_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connects: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            rearms: AtomicU64::new(0),
            read_requests: AtomicU64::new(0),
            read_success: AtomicU64::new(0),
            read_failure: AtomicU64::new(0),
            transient_failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            device_exceptions: AtomicU64::new(0),
            write_success: AtomicU64::new(0),
            write_failure: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            heartbeats_throttled: AtomicU64::new(0),
            read_latency_ms_total: AtomicU64::new(0),
            read_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            rearms: self.rearms.load(Ordering::Relaxed),
            read_requests: self.read_requests.load(Ordering::Relaxed),
            read_success: self.read_success.load(Ordering::Relaxed),
            read_failure: self.read_failure.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            device_exceptions: self.device_exceptions.load(Ordering::Relaxed),
            write_success: self.write_success.load(Ordering::Relaxed),
            write_failure: self.write_failure.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_throttled: self.heartbeats_throttled.load(Ordering::Relaxed),
            read_latency_ms_total: self.read_latency_ms_total.load(Ordering::Relaxed),
            read_latency_ms_count: self.read_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的轮询周期 ID，用于串联同一周期内的日志。
pub fn new_cycle_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录 TCP 连接建立次数。
pub fn record_connect() {
    metrics().connects.fetch_add(1, Ordering::Relaxed);
}

/// 记录 TCP 连接失败次数。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连后补发心跳次数。
pub fn record_rearm() {
    metrics().rearms.fetch_add(1, Ordering::Relaxed);
}

/// 记录 FC=04 请求次数。
pub fn record_read_request() {
    metrics().read_requests.fetch_add(1, Ordering::Relaxed);
}

/// 记录 read_keys 成功次数。
pub fn record_read_success() {
    metrics().read_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录 read_keys 失败次数（重试耗尽或不可重试错误）。
pub fn record_read_failure() {
    metrics().read_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录瞬时 IO 错误次数。
pub fn record_transient_failure() {
    metrics().transient_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录重试次数。
pub fn record_retry() {
    metrics().retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备异常响应次数。
pub fn record_device_exception() {
    metrics().device_exceptions.fetch_add(1, Ordering::Relaxed);
}

/// 记录寄存器写入成功次数。
pub fn record_write_success() {
    metrics().write_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录寄存器写入失败次数。
pub fn record_write_failure() {
    metrics().write_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录心跳实际下发次数。
pub fn record_heartbeat_sent() {
    metrics().heartbeats_sent.fetch_add(1, Ordering::Relaxed);
}

/// 记录心跳被节流次数。
pub fn record_heartbeat_throttled() {
    metrics()
        .heartbeats_throttled
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一次 read_keys 耗时（毫秒，含重试与退避）。
pub fn record_read_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .read_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .read_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
