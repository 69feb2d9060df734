//! 聊天室客户端
//!
//! 终端客户端: 每行输入作为一条消息发送，`/name <昵称>` 修改昵称，`/quit` 退出。

use std::sync::Arc;

use anyhow::{Context, Result};
use chat_client::{ChatClient, ChatMessage};
use chrono::Local;
use protocol::DEFAULT_ADDR;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_message(msg: &ChatMessage) {
    let name = if msg.name.is_empty() {
        "匿名"
    } else {
        msg.name.as_str()
    };
    println!("[{}] {}: {}", Local::now().format("%H:%M:%S"), name, msg.message);
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志（输出到 stderr，避免和聊天内容混在一起）
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chat_client=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let name = args.next();

    let client = Arc::new(
        ChatClient::dial(&addr)
            .await
            .with_context(|| format!("failed to connect to {}", addr))?,
    );
    if let Some(name) = name {
        client.set_name(&name).await?;
    }

    let mut incoming = client
        .incoming()
        .await
        .context("incoming channel already taken")?;
    let printer = tokio::spawn(async move {
        while let Some(msg) = incoming.recv().await {
            print_message(&msg);
        }
    });

    let runner = Arc::clone(&client);
    let mut reader = tokio::spawn(async move { runner.start().await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let finished = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break None };
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break None;
                }
                let result = match line.strip_prefix("/name ") {
                    Some(name) => client.set_name(name.trim()).await,
                    None => client.send_message(line).await,
                };
                if let Err(e) = result {
                    warn!("发送失败: {}", e);
                }
            }

            result = &mut reader => {
                info!("Connection closed");
                break Some(result);
            }
        }
    };

    let result = match finished {
        Some(result) => result,
        None => {
            client.close().await;
            reader.await
        }
    };

    // 读取循环结束后释放客户端，接收通道随之关闭，打印任务输出完剩余消息再退出
    drop(client);
    printer.await?;
    result??;

    Ok(())
}
