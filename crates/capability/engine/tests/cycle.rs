use async_trait::async_trait;
use domain::{Reading, now_epoch_s};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, watch};
use vacmon_bus::{BusError, BusEvent, BusPublisher};
use vacmon_engine::{
    CycleContext, CycleError, Dispatcher, OnDemandHandler, Poller, PollerConfig, RouteTable,
    SharedCycle, run_query_cycle,
};
use vacmon_protocol::{ConnectionManager, LinkConfig, Opcode};
use vacmon_store::ReadingStore;

/// 记录所有发布的测试总线。
#[derive(Default)]
struct RecordingBus {
    published: StdMutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingBus {
    fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().expect("lock").clone()
    }
}

#[async_trait]
impl BusPublisher for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.published
            .lock()
            .expect("lock")
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// 严格的模拟设备。
///
/// 每次读取必须恰好是一条以 `#` 结尾的完整命令帧；同一次读取里
/// 出现拼接命令说明两个周期在连接上交错，记一次违规。
struct MockDevice {
    port: u16,
    commands: Arc<AtomicUsize>,
    violations: Arc<AtomicUsize>,
}

async fn spawn_device(reply: &'static [u8]) -> MockDevice {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let commands = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let task_commands = commands.clone();
    let task_violations = violations.clone();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 256];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let frame = &buf[..n];
            let hashes = frame.iter().filter(|byte| **byte == b'#').count();
            if hashes != 1 || frame[n - 1] != b'#' {
                task_violations.fetch_add(1, Ordering::SeqCst);
            }
            task_commands.fetch_add(1, Ordering::SeqCst);
            if !reply.is_empty() {
                stream.write_all(reply).await.ok();
            }
        }
    });
    MockDevice {
        port,
        commands,
        violations,
    }
}

async fn shared_cycle(port: u16, dir: &tempfile::TempDir) -> SharedCycle {
    let mut link = ConnectionManager::new(LinkConfig {
        target_host: "127.0.0.1".to_string(),
        start_port: port,
        end_port: port,
        connect_retries: 2,
        send_retries: 2,
        socket_timeout: Duration::from_millis(500),
    });
    link.connect_with_retry().await.expect("connect");
    let store = ReadingStore::open(dir.path().join("Analog.json"))
        .await
        .expect("store");
    Arc::new(Mutex::new(CycleContext { link, store }))
}

#[tokio::test]
async fn poll_cycle_scales_raw_count() {
    let device = spawn_device(b"00001,REPORT_ANALOG, 1200#").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let reading = run_query_cycle(&shared, Opcode::QueryAnalog)
        .await
        .expect("cycle");
    assert_eq!(reading.value, 0.3);

    // 持久化记录与返回值一致。
    let stored = shared.lock().await.store.load().await.expect("load");
    assert_eq!(stored, reading);
    assert_eq!(device.commands.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn silent_device_counts_as_successful_zero_reading() {
    let device = spawn_device(b"").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let seeded_at = now_epoch_s() - 100;
    shared
        .lock()
        .await
        .store
        .save(&Reading {
            value: 9.9,
            interval_seconds: 0,
            timestamp: seeded_at,
        })
        .await
        .expect("seed");

    let reading = run_query_cycle(&shared, Opcode::QueryAnalog)
        .await
        .expect("cycle");
    assert_eq!(reading.value, 0.0);
    assert!(reading.timestamp >= seeded_at + 100);
    assert!((100..=103).contains(&reading.interval_seconds));
}

#[tokio::test]
async fn malformed_reply_abandons_cycle_without_update() {
    let device = spawn_device(b"NOISE#").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let seeded = Reading {
        value: 0.5,
        interval_seconds: 3,
        timestamp: now_epoch_s() - 10,
    };
    shared.lock().await.store.save(&seeded).await.expect("seed");

    let err = run_query_cycle(&shared, Opcode::QueryAnalog)
        .await
        .expect_err("must fail");
    assert!(matches!(err, CycleError::Protocol(_)));

    // 失败周期不得留下部分更新。
    let stored = shared.lock().await.store.load().await.expect("load");
    assert_eq!(stored, seeded);
}

#[tokio::test]
async fn concurrent_cycles_never_interleave() {
    let device = spawn_device(b"00001,REPORT_ANALOG,800#").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let mut tasks = Vec::new();
    for index in 0..8 {
        let shared = shared.clone();
        let opcode = if index % 2 == 0 {
            Opcode::QueryAnalog
        } else {
            Opcode::CheckAnalog
        };
        tasks.push(tokio::spawn(async move {
            run_query_cycle(&shared, opcode).await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("cycle");
    }

    assert_eq!(device.commands.load(Ordering::SeqCst), 8);
    assert_eq!(device.violations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn probe_publishes_reading_on_analog_topic() {
    let device = spawn_device(b"00001,REPORT_ANALOG, 2000#").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let bus = Arc::new(RecordingBus::default());
    let handler = OnDemandHandler::new(
        shared,
        bus.clone(),
        Arc::new(b"{\"rev\":1}".to_vec()),
        "/Devices/ws/VacuumMonitor/Config".to_string(),
        "/Devices/ws/VacuumMonitor/Analog".to_string(),
    );
    handler.handle_probe().await;

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "/Devices/ws/VacuumMonitor/Analog");
    let reading: Reading = serde_json::from_slice(&published[0].1).expect("reading");
    assert_eq!(reading.value, 0.5);
    assert_eq!(device.commands.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_config_republishes_blob_without_device_io() {
    let device = spawn_device(b"00001,REPORT_ANALOG,1#").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let blob: Vec<u8> = b"{\"sensor\":\"vacuum\",\"rev\":2}".to_vec();
    let bus = Arc::new(RecordingBus::default());
    let handler = OnDemandHandler::new(
        shared,
        bus.clone(),
        Arc::new(blob.clone()),
        "/Devices/ws/VacuumMonitor/Config".to_string(),
        "/Devices/ws/VacuumMonitor/Analog".to_string(),
    );
    handler.handle_query_config().await;

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "/Devices/ws/VacuumMonitor/Config");
    // 载荷逐字节原样转发。
    assert_eq!(published[0].1, blob);
    assert_eq!(device.commands.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dispatcher_routes_events_and_ignores_unknown_topics() {
    let device = spawn_device(b"00001,REPORT_ANALOG,400#").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let blob: Vec<u8> = b"{\"rev\":3}".to_vec();
    let bus = Arc::new(RecordingBus::default());
    let handler = OnDemandHandler::new(
        shared,
        bus.clone(),
        Arc::new(blob.clone()),
        "/Devices/ws/VacuumMonitor/Config".to_string(),
        "/Devices/ws/VacuumMonitor/Analog".to_string(),
    );
    let dispatcher = Dispatcher::new(
        handler,
        RouteTable {
            query_config_topic: "/Devices/adc_agent/QueryConfig".to_string(),
            probe_topics: vec!["/Test".to_string(), "/Try".to_string()],
        },
    );

    let (tx, rx) = mpsc::channel(8);
    for (topic, payload) in [
        ("/Devices/unrelated", b"x".to_vec()),
        ("/Devices/adc_agent/QueryConfig", Vec::new()),
        ("/Try", Vec::new()),
    ] {
        tx.send(BusEvent {
            topic: topic.to_string(),
            payload,
        })
        .await
        .expect("send");
    }
    drop(tx);
    dispatcher.run(rx).await;

    let published = bus.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, "/Devices/ws/VacuumMonitor/Config");
    assert_eq!(published[0].1, blob);
    assert_eq!(published[1].0, "/Devices/ws/VacuumMonitor/Analog");
    let reading: Reading = serde_json::from_slice(&published[1].1).expect("reading");
    assert_eq!(reading.value, 0.1);
    // 只有探测事件触碰设备。
    assert_eq!(device.commands.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn poller_reports_until_shutdown() {
    let device = spawn_device(b"00001,REPORT_ANALOG,1200#").await;
    let dir = tempfile::tempdir().expect("tempdir");
    let shared = shared_cycle(device.port, &dir).await;

    let bus = Arc::new(RecordingBus::default());
    let poller = Poller::new(
        shared,
        bus.clone(),
        PollerConfig {
            report_interval: Duration::from_millis(150),
            analog_topic: "/Devices/ws/VacuumMonitor/Analog".to_string(),
        },
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = poller.spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(600)).await;
    shutdown_tx.send(true).expect("shutdown");
    handle.await.expect("join");

    let count = bus.published().len();
    assert!(count >= 1, "no reading published before shutdown");

    // 关停后不再发布。
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(bus.published().len(), count);
}
