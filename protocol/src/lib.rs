//! 聊天服务共享协议库
//!
//! 包含:
//! - 命令类型定义 (Command)
//! - 传输层抽象 (Transport trait)
//! - 行协议编解码 (CommandReader, CommandWriter)
//! - 连接封装 (Connection)

mod message;
mod constants;
mod transport;
mod codec;
mod connection;
mod error;

pub use message::{validate_message, validate_name, Command};
pub use constants::*;
pub use transport::{Transport, TransportListener, TransportConfig, TcpTransport, TcpListener};
pub use codec::{decode_line, encode, CommandReader, CommandWriter};
pub use connection::Connection;
pub use error::{ProtocolError, Result};
