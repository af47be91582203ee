//! 设备命令编解码
//!
//! 请求/回复均为 ASCII 帧。请求：`"00000,<OPCODE>#"`；回复：任意字节流中
//! 包含 `",REPORT_ANALOG,<digits>"` 即视为有效，标记之前的内容一律忽略
//! （兼容固件升级后在前部追加的遥测字段）。

use crate::error::ProtocolError;

/// 本代协议的工位号固定为 00000。
const STATION_ID: &str = "00000";

/// 回复中的模拟量标记。
const REPLY_MARKER: &str = ",REPORT_ANALOG,";

/// 设备命令操作码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// 定时轮询查询
    QueryAnalog,
    /// 按需探测查询
    CheckAnalog,
}

impl Opcode {
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::QueryAnalog => "QUERY_ANALOG",
            Opcode::CheckAnalog => "CHECK_ANALOG",
        }
    }
}

/// 编码命令帧。
pub fn encode(opcode: Opcode) -> Vec<u8> {
    format!("{},{}#", STATION_ID, opcode.as_str()).into_bytes()
}

/// 解码设备回复为原始计数。
///
/// 空输入表示读超时内没有任何数据：按协议约定视为合法的零读数
/// （协议层面无法区分"设备空闲"与"设备不可达"，保持原有语义）。
pub fn decode(raw: &[u8]) -> Result<u64, ProtocolError> {
    if raw.is_empty() {
        return Ok(0);
    }
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::MalformedReply)?;
    let rest = match text.find(REPLY_MARKER) {
        Some(index) => &text[index + REPLY_MARKER.len()..],
        None => return Err(ProtocolError::MalformedReply),
    };
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return Err(ProtocolError::MalformedReply);
    }
    digits.parse().map_err(|_| ProtocolError::MalformedReply)
}
