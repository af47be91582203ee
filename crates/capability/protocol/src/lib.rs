//! 设备协议能力：ASCII 命令编解码与 TCP 连接管理。

pub mod codec;
pub mod connection;
pub mod error;

pub use codec::{Opcode, decode, encode};
pub use connection::{ConnectionManager, LinkConfig, LinkState};
pub use error::{ConnectionError, ProtocolError};
