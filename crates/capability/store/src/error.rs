//! 存储层错误类型

/// 读数记录/配置载荷的读写错误。
///
/// 周期内的存储失败只丢弃本次更新，上一条持久化记录仍然有效。
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 解码错误
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON 编码错误
    #[error("encode error: {0}")]
    Encode(String),
}
