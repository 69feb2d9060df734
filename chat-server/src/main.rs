//! 聊天室服务端
//!
//! 基于 Tokio 的异步 TCP 服务器

use std::sync::Arc;

use anyhow::Result;
use chat_server::{ChatServer, ServerConfig};
use protocol::DEFAULT_ADDR;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_server=debug".parse()?)
                .add_directive("protocol=debug".parse()?),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    info!("Chat Server starting on {}", addr);

    let server = Arc::new(ChatServer::new(ServerConfig::default()));
    server.listen(&addr).await?;

    // 监听 Ctrl+C 信号
    let closer = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, closing listener...");
            closer.close();
        }
    });

    server.start().await?;
    info!("Server stopped");

    Ok(())
}
