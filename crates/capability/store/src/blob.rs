//! 配置载荷加载
//!
//! 启动时读取一次待发送的配置文档，校验为合法 JSON 并压缩序列化；
//! 此后在 QueryConfig 事件上原样重发，核心不修改其内容。

use crate::error::StoreError;
use std::path::Path;
use tokio::fs;

/// 加载并校验配置载荷。
pub async fn load_config_blob(path: impl AsRef<Path>) -> Result<Vec<u8>, StoreError> {
    let bytes = fs::read(path).await?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|err| StoreError::Decode(err.to_string()))?;
    serde_json::to_vec(&value).map_err(|err| StoreError::Encode(err.to_string()))
}
