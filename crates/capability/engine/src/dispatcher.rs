//! 入站事件分发器
//!
//! 在专用接收循环里消费总线入站通道，按主题精确匹配路由到按需处理器。
//! 自身不持有路由表之外的状态。

use crate::ondemand::OnDemandHandler;
use tokio::sync::mpsc;
use tracing::debug;
use vacmon_bus::BusEvent;

/// 订阅路由表。
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub query_config_topic: String,
    pub probe_topics: Vec<String>,
}

/// 入站事件分发器。
pub struct Dispatcher {
    handler: OnDemandHandler,
    routes: RouteTable,
}

impl Dispatcher {
    pub fn new(handler: OnDemandHandler, routes: RouteTable) -> Self {
        Self { handler, routes }
    }

    /// 消费入站事件直到通道关闭；未知主题忽略。
    pub async fn run(self, mut events: mpsc::Receiver<BusEvent>) {
        while let Some(event) = events.recv().await {
            if event.topic == self.routes.query_config_topic {
                self.handler.handle_query_config().await;
            } else if self.routes.probe_topics.iter().any(|topic| *topic == event.topic) {
                self.handler.handle_probe().await;
            } else {
                debug!(topic = %event.topic, "topic ignored");
            }
        }
        debug!("inbound channel closed, dispatcher stopping");
    }
}
