//! 追踪与采集周期指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub poll_cycles_ok: u64,
    pub poll_cycles_failed: u64,
    pub probe_cycles_ok: u64,
    pub probe_cycles_failed: u64,
    pub config_requests: u64,
    pub publish_failures: u64,
    pub reconnects: u64,
    pub read_timeouts: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    poll_cycles_ok: AtomicU64,
    poll_cycles_failed: AtomicU64,
    probe_cycles_ok: AtomicU64,
    probe_cycles_failed: AtomicU64,
    config_requests: AtomicU64,
    publish_failures: AtomicU64,
    reconnects: AtomicU64,
    read_timeouts: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            poll_cycles_ok: AtomicU64::new(0),
            poll_cycles_failed: AtomicU64::new(0),
            probe_cycles_ok: AtomicU64::new(0),
            probe_cycles_failed: AtomicU64::new(0),
            config_requests: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            read_timeouts: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            poll_cycles_ok: self.poll_cycles_ok.load(Ordering::Relaxed),
            poll_cycles_failed: self.poll_cycles_failed.load(Ordering::Relaxed),
            probe_cycles_ok: self.probe_cycles_ok.load(Ordering::Relaxed),
            probe_cycles_failed: self.probe_cycles_failed.load(Ordering::Relaxed),
            config_requests: self.config_requests.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
        }
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

/// 生成新的 cycle_id，用于单个查询周期的日志关联。
pub fn new_cycle_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录定时轮询周期成功次数。
pub fn record_poll_cycle_ok() {
    metrics().poll_cycles_ok.fetch_add(1, Ordering::Relaxed);
}

/// 记录定时轮询周期失败次数。
pub fn record_poll_cycle_failed() {
    metrics().poll_cycles_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录按需探测周期成功次数。
pub fn record_probe_cycle_ok() {
    metrics().probe_cycles_ok.fetch_add(1, Ordering::Relaxed);
}

/// 记录按需探测周期失败次数。
pub fn record_probe_cycle_failed() {
    metrics().probe_cycles_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录配置查询事件次数。
pub fn record_config_request() {
    metrics().config_requests.fetch_add(1, Ordering::Relaxed);
}

/// 记录总线发布失败次数（发布即弃，不重试）。
pub fn record_publish_failure() {
    metrics().publish_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备链路重连次数。
pub fn record_reconnect() {
    metrics().reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录读超时次数（按协议约定视为零读数）。
pub fn record_read_timeout() {
    metrics().read_timeouts.fetch_add(1, Ordering::Relaxed);
}
