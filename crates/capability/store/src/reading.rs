//! 读数记录文件
//!
//! 单个 JSON 文件保存最近一次成功读数（`{"value","interval","timestamp"}`）。
//! 两条写路径（轮询与探测）都在引擎的周期锁内做读-改-写，
//! 本模块只保证单次写入不会留下截断的记录。

use crate::error::StoreError;
use domain::{Reading, now_epoch_s};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// 读数记录存储。
pub struct ReadingStore {
    path: PathBuf,
}

impl ReadingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 打开记录文件；文件缺失时以启动时刻播种一条零读数记录。
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        if !fs::try_exists(&store.path).await? {
            store.save(&Reading::initial(now_epoch_s())).await?;
            info!(path = %store.path.display(), "reading record seeded");
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取上一次成功读数。
    pub async fn load(&self) -> Result<Reading, StoreError> {
        let bytes = fs::read(&self.path).await?;
        serde_json::from_slice(&bytes).map_err(|err| StoreError::Decode(err.to_string()))
    }

    /// 整体替换记录：写入临时文件后原子改名，避免进程中断留下半条记录。
    pub async fn save(&self, reading: &Reading) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(reading).map_err(|err| StoreError::Encode(err.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
