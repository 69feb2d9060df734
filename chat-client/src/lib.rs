//! 聊天室客户端库

mod client;

pub use client::{ChatClient, ChatMessage};
