//! 查询周期
//!
//! 轮询器与按需探测共用同一个周期实现，仅操作码不同。
//! 一把互斥锁覆盖"发命令、读回复、更新读数记录"的完整周期：
//! 协议是严格的请求/回复且无多路复用，粗粒度锁即是正确粒度，
//! 否则两条路径的命令与回复字节可能在同一条连接上交错。

use domain::{Reading, now_epoch_s};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use vacmon_protocol::{ConnectionError, ConnectionManager, Opcode, ProtocolError, codec};
use vacmon_store::{ReadingStore, StoreError};
use vacmon_telemetry::new_cycle_id;

/// 命令发出与读取回复之间的固定整定等待。
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// 查询周期错误。
///
/// 任何一种失败都只放弃本周期：记录不更新、不发布，进程继续运行。
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// 周期锁保护的共享上下文：设备连接与读数记录。
///
/// 锁外不得触碰其中任何状态。
pub struct CycleContext {
    pub link: ConnectionManager,
    pub store: ReadingStore,
}

/// 轮询器与按需探测共持的周期句柄。
pub type SharedCycle = Arc<Mutex<CycleContext>>;

/// 执行一个完整查询周期，返回已持久化的读数。
///
/// 发布不在锁内：由调用方在锁释放后进行，允许与下一周期重排。
pub async fn run_query_cycle(shared: &SharedCycle, opcode: Opcode) -> Result<Reading, CycleError> {
    let cycle_id = new_cycle_id();
    let mut ctx = shared.lock().await;
    debug!(cycle_id = %cycle_id, opcode = opcode.as_str(), "cycle started");

    ctx.link.wait_writable().await?;
    ctx.link.send_with_retry(&codec::encode(opcode)).await?;
    tokio::time::sleep(SETTLE_DELAY).await;
    let reply = ctx.link.read_with_timeout().await?;
    let raw_count = codec::decode(&reply)?;

    let previous = ctx.store.load().await?;
    let reading = Reading::from_raw_count(raw_count, previous.timestamp, now_epoch_s());
    ctx.store.save(&reading).await?;

    info!(
        cycle_id = %cycle_id,
        opcode = opcode.as_str(),
        raw_count,
        value = reading.value,
        interval = reading.interval_seconds,
        "cycle completed"
    );
    Ok(reading)
}
