//! TCP 连接管理
//!
//! 在候选端口区间内扫描建立连接，提供有界重连与有界重发。
//! 协议为严格的请求/回复模式，同一时刻只允许一个在途请求，
//! 串行化由上层的周期锁保证。

use crate::error::ConnectionError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use vacmon_telemetry::{record_read_timeout, record_reconnect};

/// 设备链路配置。
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// 设备主机地址
    pub target_host: String,
    /// 候选端口区间起点
    pub start_port: u16,
    /// 候选端口区间终点（含）
    pub end_port: u16,
    /// 重连轮次上限
    pub connect_retries: u32,
    /// 单轮发送重试上限
    pub send_retries: u32,
    /// 连接/就绪/读取的超时
    pub socket_timeout: Duration,
}

/// 链路状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// 未绑定任何端口
    Unbound,
    /// 已绑定并可用
    Bound,
    /// 发送失败、正在重连
    Degraded,
}

/// 设备连接管理器。
///
/// 持有唯一的 TCP 连接；进程生命周期内不销毁，重连时仅重置端口与流。
pub struct ConnectionManager {
    config: LinkConfig,
    stream: Option<TcpStream>,
    active_port: u16,
    state: LinkState,
}

impl ConnectionManager {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            stream: None,
            active_port: 0,
            state: LinkState::Unbound,
        }
    }

    /// 当前绑定端口（0 表示未绑定）。
    pub fn active_port(&self) -> u16 {
        self.active_port
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// 扫描候选端口区间，升序尝试，首个接受连接的端口胜出。
    ///
    /// 每个端口的连接尝试由 socket_timeout 限界。
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.disconnect_stream();
        info!("starting to connect to {}", self.config.target_host);
        for port in self.config.start_port..=self.config.end_port {
            debug!(port, "trying port");
            let attempt = TcpStream::connect((self.config.target_host.as_str(), port));
            match timeout(self.config.socket_timeout, attempt).await {
                Ok(Ok(stream)) => {
                    self.stream = Some(stream);
                    self.active_port = port;
                    self.state = LinkState::Bound;
                    info!("connected to {}:{}", self.config.target_host, port);
                    return Ok(());
                }
                Ok(Err(err)) => warn!(port, error = %err, "port failed"),
                Err(_) => warn!(port, "port connect timed out"),
            }
        }
        warn!("all ports failed");
        self.state = LinkState::Unbound;
        Err(ConnectionError::NoPortAvailable)
    }

    /// 有界重连：最多 connect_retries 轮完整扫描，成功后做零长写探活。
    pub async fn connect_with_retry(&mut self) -> Result<(), ConnectionError> {
        for attempt in 1..=self.config.connect_retries {
            info!(attempt, "connect attempt");
            if self.connect().await.is_ok() && self.is_alive() {
                return Ok(());
            }
        }
        warn!(
            retries = self.config.connect_retries,
            "socket connect failed"
        );
        Err(ConnectionError::ConnectFailed)
    }

    /// 零长发送探活；失败则降级为未绑定。
    pub fn is_alive(&mut self) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };
        match stream.try_write(&[]) {
            Ok(_) => true,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => true,
            Err(err) => {
                warn!(error = %err, "liveness probe failed");
                self.disconnect();
                false
            }
        }
    }

    /// 有界重发：内层最多 send_retries 次发送（间隔 1 秒），内层耗尽后
    /// 关闭连接并在下一轮前做恰好一次完整端口扫描；外层最多
    /// connect_retries 轮。全部耗尽返回 send failed。
    pub async fn send_with_retry(&mut self, frame: &[u8]) -> Result<(), ConnectionError> {
        for round in 1..=self.config.connect_retries {
            if self.stream.is_some() && self.try_send(frame).await {
                return Ok(());
            }
            warn!(round, "send retries exhausted, reconnecting");
            self.state = LinkState::Degraded;
            self.disconnect_stream();
            record_reconnect();
            let _ = self.connect().await;
        }
        warn!(
            rounds = self.config.connect_retries,
            "reconnect rounds exhausted, send fail"
        );
        Err(ConnectionError::SendFailed)
    }

    async fn try_send(&mut self, frame: &[u8]) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        for attempt in 1..=self.config.send_retries {
            match stream.write_all(frame).await {
                Ok(()) => return true,
                Err(err) => {
                    warn!(attempt, error = %err, "socket send failed");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
        false
    }

    /// 写就绪等待；超时返回 timeout 错误，调用方放弃本周期。
    pub async fn wait_writable(&mut self) -> Result<(), ConnectionError> {
        let stream = self.stream.as_ref().ok_or(ConnectionError::NotConnected)?;
        timeout(self.config.socket_timeout, stream.writable())
            .await
            .map_err(|_| ConnectionError::Timeout("write readiness"))?
            .map_err(ConnectionError::Io)
    }

    /// 有界读取一帧回复。
    ///
    /// 超时与对端关闭均返回空字节（由编解码层按零读数处理）；
    /// 仅真实的 socket 错误向上传播。
    pub async fn read_with_timeout(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let read_timeout = self.config.socket_timeout;
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
        let mut buf = vec![0u8; 1024];
        match timeout(read_timeout, stream.read(&mut buf)).await {
            Err(_) => {
                record_read_timeout();
                debug!("read timed out, empty reply");
                Ok(Vec::new())
            }
            Ok(Ok(0)) => Ok(Vec::new()),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(err)) => Err(ConnectionError::Io(err)),
        }
    }

    /// 释放连接并回到未绑定状态。
    pub fn disconnect(&mut self) {
        self.disconnect_stream();
        self.state = LinkState::Unbound;
    }

    fn disconnect_stream(&mut self) {
        self.stream = None;
        self.active_port = 0;
    }
}
