//! 协议错误类型定义

/// 设备回复解码错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 回复不是合法文本，或缺少 REPORT_ANALOG 标记
    #[error("malformed reply")]
    MalformedReply,
}

/// 连接与收发错误
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// 端口扫描一轮后没有任何端口接受连接
    #[error("no port available")]
    NoPortAvailable,

    /// 重连轮次耗尽仍未建立连接
    #[error("connect failed")]
    ConnectFailed,

    /// 发送重试与重连轮次全部耗尽
    #[error("send failed")]
    SendFailed,

    /// 就绪等待超时，调用方应放弃本周期
    #[error("timeout: {0}")]
    Timeout(&'static str),

    /// 当前没有已建立的连接
    #[error("not connected")]
    NotConnected,

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
