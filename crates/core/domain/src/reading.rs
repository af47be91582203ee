use serde::{Deserialize, Serialize};

/// 模拟量原始计数到物理值的固定换算系数。
pub const ANALOG_SCALE: f64 = 4000.0;

/// 最近一次成功采集的模拟量读数。
///
/// 序列化字段名与持久化文件及 Analog 主题载荷一致：
/// `{"value":…,"interval":…,"timestamp":…}`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// 物理值：设备原始计数 / ANALOG_SCALE。
    pub value: f64,
    /// 与上一次成功读数之间的间隔（秒）。
    #[serde(rename = "interval")]
    pub interval_seconds: i64,
    /// 本次成功解码的 Unix 时间戳（秒）。
    pub timestamp: i64,
}

impl Reading {
    /// 由原始计数和上一次读数的时间戳构造新读数。
    ///
    /// `timestamp` 不回退：若时钟回拨则沿用上一次时间戳。
    pub fn from_raw_count(raw_count: u64, previous_timestamp: i64, now: i64) -> Self {
        let timestamp = now.max(previous_timestamp);
        Self {
            value: raw_count as f64 / ANALOG_SCALE,
            interval_seconds: timestamp - previous_timestamp,
            timestamp,
        }
    }

    /// 进程启动时的初始记录（尚无成功读数）。
    pub fn initial(now: i64) -> Self {
        Self {
            value: 0.0,
            interval_seconds: 0,
            timestamp: now,
        }
    }
}

/// 获取当前 Unix 时间戳（秒）。
pub fn now_epoch_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
