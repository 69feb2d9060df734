//! 聊天客户端核心实现

use protocol::{
    Command, CommandReader, CommandWriter, Connection, ProtocolError, Result, TcpTransport,
    Transport, TransportConfig,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

/// 等待关闭信号，`wait_for` 返回的 `Ref` 在返回前丢弃
async fn wait_closed(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|closed| *closed).await;
}

/// 收到的聊天消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// 发送者昵称，匿名用户为空
    pub name: String,
    pub message: String,
}

/// 聊天客户端
///
/// 所有方法都只需要 `&self`，可以放进 `Arc` 里让读取循环和发送方共用。
pub struct ChatClient {
    reader: Mutex<CommandReader<OwnedReadHalf>>,
    writer: Mutex<CommandWriter<OwnedWriteHalf>>,
    /// 最近一次成功设置的昵称
    name: RwLock<String>,
    /// 单槽通道: 消费者不取走消息时读取循环会停下，不再读 socket
    incoming_tx: mpsc::Sender<ChatMessage>,
    incoming_rx: Mutex<Option<mpsc::Receiver<ChatMessage>>>,
    /// 关闭信号发送端
    shutdown_tx: watch::Sender<bool>,
}

impl ChatClient {
    /// 连接服务器
    pub async fn dial(addr: &str) -> Result<Self> {
        Self::dial_with_config(addr, &TransportConfig::default()).await
    }

    /// 使用指定配置连接服务器；连接失败时直接返回错误
    pub async fn dial_with_config(addr: &str, config: &TransportConfig) -> Result<Self> {
        let transport = TcpTransport::connect(addr, config).await?;
        info!("Connected to {}", addr);

        let (reader, writer) = Connection::new(transport).split();
        let (incoming_tx, incoming_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            name: RwLock::new(String::new()),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            shutdown_tx,
        })
    }

    /// 发送一条命令，编解码错误原样返回
    ///
    /// 写入被对端卡住时，close 会中断这次发送并返回 `ConnectionClosed`。
    pub async fn send(&self, command: &Command) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            _ = wait_closed(&mut shutdown_rx) => Err(ProtocolError::ConnectionClosed),
            result = writer.write_command(command) => result,
        }
    }

    /// 设置昵称
    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.send(&Command::Name {
            name: name.to_string(),
        })
        .await?;
        *self.name.write().await = name.to_string();
        Ok(())
    }

    /// 发送聊天消息
    pub async fn send_message(&self, message: &str) -> Result<()> {
        self.send(&Command::Send {
            message: message.to_string(),
        })
        .await
    }

    /// 当前昵称
    pub async fn name(&self) -> String {
        self.name.read().await.clone()
    }

    /// 取出接收通道，只能取一次
    pub async fn incoming(&self) -> Option<mpsc::Receiver<ChatMessage>> {
        self.incoming_rx.lock().await.take()
    }

    /// 读取循环，直到服务器断开或调用 close
    ///
    /// 收到的 `Message` 会等待消费者取走后才继续读取。
    pub async fn start(&self) -> Result<()> {
        let mut reader = self.reader.lock().await;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let result = tokio::select! {
                result = reader.read_command() => result,
                _ = wait_closed(&mut shutdown_rx) => break,
            };

            match result {
                Ok(Command::Message { name, message }) => {
                    let msg = ChatMessage { name, message };
                    tokio::select! {
                        sent = self.incoming_tx.send(msg) => {
                            if sent.is_err() {
                                debug!("Incoming receiver dropped, discarding message");
                            }
                        }
                        _ = wait_closed(&mut shutdown_rx) => break,
                    }
                }
                Ok(other) => {
                    warn!("Unexpected {} command from server", other.keyword());
                }
                Err(ProtocolError::ConnectionClosed) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Read error: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// 关闭连接，使 start 和正在进行的 send 返回
    pub async fn close(&self) {
        self.shutdown_tx.send_replace(true);
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Shutdown failed: {}", e);
        }
    }
}
