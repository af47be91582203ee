//! 真空计采集桥接进程：配置装载、链路建立、轮询与分发任务装配。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};
use vacmon_bus::{MqttBus, MqttBusConfig};
use vacmon_config::AgentConfig;
use vacmon_engine::{
    CycleContext, Dispatcher, OnDemandHandler, Poller, PollerConfig, RouteTable,
};
use vacmon_protocol::{ConnectionManager, LinkConfig};
use vacmon_store::{ReadingStore, load_config_blob};
use vacmon_telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置（缺失/非法即终止启动）
    let config = AgentConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();
    info!("initializing");

    // 启动期一次性装载：待发送配置载荷、读数记录文件
    let config_blob = Arc::new(load_config_blob(&config.config_blob_path).await?);
    let store = ReadingStore::open(&config.reading_path).await?;

    // 首次连接失败是致命的：引擎不启动
    let mut link = ConnectionManager::new(LinkConfig {
        target_host: config.target_host.clone(),
        start_port: config.start_port,
        end_port: config.end_port,
        connect_retries: config.connect_retries,
        send_retries: config.send_retries,
        socket_timeout: Duration::from_secs(config.socket_timeout_seconds),
    });
    link.connect_with_retry().await?;

    // MQTT 总线：订阅配置查询与探测主题，入站事件经通道交给分发器
    let (bus, events, bus_task) = MqttBus::connect(
        MqttBusConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            qos: 0,
        },
        &subscriptions(&config),
    )
    .await?;
    let bus = Arc::new(bus);

    // 周期锁上下文：连接与读数记录由轮询与探测两条路径共享
    let shared = Arc::new(Mutex::new(CycleContext { link, store }));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = Poller::new(
        shared.clone(),
        bus.clone(),
        PollerConfig {
            report_interval: Duration::from_secs(config.report_interval_seconds),
            analog_topic: config.analog_topic.clone(),
        },
    );
    let poller_task = poller.spawn(shutdown_rx);

    let handler = OnDemandHandler::new(
        shared,
        bus,
        config_blob,
        config.config_topic.clone(),
        config.analog_topic.clone(),
    );
    let dispatcher = Dispatcher::new(
        handler,
        RouteTable {
            query_config_topic: config.query_config_topic.clone(),
            probe_topics: config.probe_topics.clone(),
        },
    );

    info!(
        target_host = %config.target_host,
        analog_topic = %config.analog_topic,
        interval = config.report_interval_seconds,
        "agent started"
    );

    // 分发循环与 ctrl_c 二选一退出
    tokio::select! {
        _ = dispatcher.run(events) => warn!("dispatcher stopped"),
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    // 协作式关停：通知轮询器并等待其结束当前周期
    shutdown_tx.send(true).ok();
    if let Err(err) = poller_task.await {
        warn!(error = %err, "poller task join failed");
    }
    bus_task.abort();
    info!("agent stopped");
    Ok(())
}

/// 订阅清单：配置查询主题加全部探测主题。
fn subscriptions(config: &AgentConfig) -> Vec<String> {
    let mut topics = vec![config.query_config_topic.clone()];
    topics.extend(config.probe_topics.iter().cloned());
    topics
}
