//! 按需处理器
//!
//! 响应入站总线事件：QueryConfig 原样重发配置载荷（不触碰设备）；
//! 探测事件在与轮询器同一把周期锁下执行一次 CHECK_ANALOG 查询。

use crate::cycle::{SharedCycle, run_query_cycle};
use crate::poller::publish_reading;
use std::sync::Arc;
use tracing::{info, warn};
use vacmon_bus::BusPublisher;
use vacmon_protocol::Opcode;
use vacmon_telemetry::{
    record_config_request, record_probe_cycle_failed, record_probe_cycle_ok,
    record_publish_failure,
};

/// 按需处理器。
pub struct OnDemandHandler {
    shared: SharedCycle,
    bus: Arc<dyn BusPublisher>,
    config_blob: Arc<Vec<u8>>,
    config_topic: String,
    analog_topic: String,
}

impl OnDemandHandler {
    pub fn new(
        shared: SharedCycle,
        bus: Arc<dyn BusPublisher>,
        config_blob: Arc<Vec<u8>>,
        config_topic: String,
        analog_topic: String,
    ) -> Self {
        Self {
            shared,
            bus,
            config_blob,
            config_topic,
            analog_topic,
        }
    }

    /// QueryConfig 事件：配置载荷原样发布到配置主题。
    pub async fn handle_query_config(&self) {
        record_config_request();
        let payload = self.config_blob.as_ref().clone();
        match self.bus.publish(&self.config_topic, payload).await {
            Ok(()) => info!(topic = %self.config_topic, "config message published"),
            Err(err) => {
                record_publish_failure();
                warn!(topic = %self.config_topic, error = %err, "config publish failed");
            }
        }
    }

    /// 探测事件：一次 CHECK_ANALOG 周期，成功才发布读数。
    pub async fn handle_probe(&self) {
        match run_query_cycle(&self.shared, Opcode::CheckAnalog).await {
            Ok(reading) => {
                record_probe_cycle_ok();
                publish_reading(self.bus.as_ref(), &self.analog_topic, &reading).await;
            }
            Err(err) => {
                record_probe_cycle_failed();
                warn!(error = %err, "probe cycle abandoned");
            }
        }
    }
}
