//! 定时轮询器
//!
//! 单个常驻后台任务：每隔 report_interval 执行一次 QUERY_ANALOG 周期，
//! 成功后把持久化读数发布到模拟量主题。单周期失败记录后跳过，
//! 循环只因关停信号退出。

use crate::cycle::{SharedCycle, run_query_cycle};
use domain::Reading;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vacmon_bus::BusPublisher;
use vacmon_protocol::Opcode;
use vacmon_telemetry::{record_poll_cycle_failed, record_poll_cycle_ok, record_publish_failure};

/// 定时轮询器配置。
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub report_interval: Duration,
    pub analog_topic: String,
}

/// 定时轮询器。
pub struct Poller {
    shared: SharedCycle,
    bus: Arc<dyn BusPublisher>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(shared: SharedCycle, bus: Arc<dyn BusPublisher>, config: PollerConfig) -> Self {
        Self {
            shared,
            bus,
            config,
        }
    }

    /// 启动轮询任务。
    ///
    /// 间隔从上一周期结束时刻起算，不补偿漂移；
    /// 关停信号只在等待期间被观察，不打断在途 IO。
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("scheduled report loop started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.report_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                match run_query_cycle(&self.shared, Opcode::QueryAnalog).await {
                    Ok(reading) => {
                        record_poll_cycle_ok();
                        publish_reading(self.bus.as_ref(), &self.config.analog_topic, &reading)
                            .await;
                    }
                    Err(err) => {
                        record_poll_cycle_failed();
                        warn!(error = %err, "poll cycle abandoned");
                    }
                }
            }
            info!("scheduled report loop stopped");
        })
    }
}

/// 序列化读数并发布到模拟量主题；失败只记录与计数，发后即弃。
pub(crate) async fn publish_reading(bus: &dyn BusPublisher, topic: &str, reading: &Reading) {
    let payload = match serde_json::to_vec(reading) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "reading serialization failed");
            return;
        }
    };
    match bus.publish(topic, payload).await {
        Ok(()) => info!(topic = %topic, "analog message published"),
        Err(err) => {
            record_publish_failure();
            warn!(topic = %topic, error = %err, "analog publish failed");
        }
    }
}
