//! 聊天室服务端
//!
//! 每个连接一个读取任务和一个写入任务，广播只向各连接的发送队列入队。

mod registry;
mod server;

pub use registry::{Peer, PeerId, Registry};
pub use server::{ChatServer, ServerConfig};
