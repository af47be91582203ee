//! 消息总线能力：MQTT 发布/订阅与入站事件通道。
//!
//! 入站消息经 mpsc 通道交给分发器的接收循环消费，
//! 将 MQTT 客户端自身的线程模型与核心的周期锁约束解耦。
//! 发布是发后即弃：失败只记录与计数，不重试不缓存。

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 总线错误。
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("subscribe error: {0}")]
    Subscribe(String),
    #[error("publish error: {0}")]
    Publish(String),
}

/// 入站总线事件。
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// 总线发布抽象。
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// MQTT 总线配置。
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
}

/// MQTT 总线客户端。
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    qos: QoS,
}

impl MqttBus {
    /// 建立连接并订阅给定主题。
    ///
    /// 返回入站事件接收端与事件循环任务句柄；事件循环出错时
    /// 记录后休眠 1 秒再继续轮询（rumqttc 内部负责重连）。
    pub async fn connect(
        config: MqttBusConfig,
        subscriptions: &[String],
    ) -> Result<(Self, mpsc::Receiver<BusEvent>, tokio::task::JoinHandle<()>), BusError> {
        let client_id = format!("vacmon-agent-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let qos = qos_from_u8(config.qos);
        for topic in subscriptions {
            client
                .subscribe(topic.clone(), qos)
                .await
                .map_err(|err| BusError::Subscribe(err.to_string()))?;
            info!(topic = %topic, "subscribed");
        }

        let (tx, rx) = mpsc::channel(32);
        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let event = BusEvent {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        if tx.send(event).await.is_err() {
                            info!("inbound channel closed, bus eventloop stopping");
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("mqtt eventloop error: {}", err);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok((Self { client, qos }, rx, handle))
    }
}

#[async_trait]
impl BusPublisher for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|err| BusError::Publish(err.to_string()))
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}
