//! 聊天服务器核心实现

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use protocol::{
    validate_name, Command, CommandReader, CommandWriter, ProtocolError, TcpListener,
    TcpTransport, Transport, TransportListener, MAX_LINE_LEN, OUTBOUND_QUEUE_CAPACITY,
    WRITE_TIMEOUT,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::registry::{wait_closed, Peer, Registry};

/// 服务器配置
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// 每个连接的发送队列容量，队列满时丢弃新消息
    pub outbound_capacity: usize,
    /// 单条命令的写入超时，超时视为对端卡死并断开
    pub write_timeout: Duration,
    /// 单行最大长度
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: OUTBOUND_QUEUE_CAPACITY,
            write_timeout: WRITE_TIMEOUT,
            max_line_len: MAX_LINE_LEN,
        }
    }
}

/// 共享状态，每个连接任务各持一份 Arc
struct SharedState {
    registry: Registry,
    config: ServerConfig,
}

/// 聊天服务器
pub struct ChatServer {
    state: Arc<SharedState>,
    listener: Mutex<Option<TcpListener>>,
    /// 是否已经调用过 listen
    bound: AtomicBool,
    /// 关闭信号发送端
    shutdown_tx: watch::Sender<bool>,
}

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Arc::new(SharedState {
                registry: Registry::new(),
                config,
            }),
            listener: Mutex::new(None),
            bound: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// 绑定监听地址，返回实际绑定的地址
    ///
    /// 同一实例只能成功调用一次。
    pub async fn listen(&self, addr: &str) -> anyhow::Result<SocketAddr> {
        let mut slot = self.listener.lock().await;
        if self.bound.load(Ordering::SeqCst) {
            bail!("server is already listening");
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        *slot = Some(listener);
        self.bound.store(true, Ordering::SeqCst);
        Ok(local_addr)
    }

    /// 运行 accept 循环，直到 close 被调用
    ///
    /// 单个连接的 accept 失败只记录日志，不会终止循环。
    pub async fn start(&self) -> anyhow::Result<()> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("server is not listening"))?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(transport) => {
                            let state = Arc::clone(&self.state);
                            let accepted = state.accept(transport).await;
                            match accepted {
                                Ok((peer, reader)) => {
                                    tokio::spawn(state.serve(peer, reader));
                                }
                                Err(e) => {
                                    error!("Failed to set up connection: {}", e);
                                }
                            }
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                _ = wait_closed(&mut shutdown_rx) => {
                    info!("Listener closed");
                    break;
                }
            }
        }

        Ok(())
    }

    /// 关闭监听，使 start 返回；已建立的连接不受影响
    pub fn close(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// 向所有在线连接广播一条命令（包括发送者本人）
    ///
    /// 返回成功入队的连接数。命令不合法时直接返回错误，不会入队。
    pub async fn broadcast(&self, command: Command) -> protocol::Result<usize> {
        command.validate()?;
        Ok(self.state.broadcast(command).await)
    }

    /// 当前在线连接数
    pub async fn peer_count(&self) -> usize {
        self.state.registry.len().await
    }
}

impl Default for ChatServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl SharedState {
    /// 登记新连接并启动它的写入任务
    async fn accept(
        &self,
        transport: TcpTransport,
    ) -> protocol::Result<(Arc<Peer>, CommandReader<OwnedReadHalf>)> {
        let addr = transport.peer_addr()?;
        let (read_half, write_half) = transport.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);

        let (peer, count) = self.registry.register(addr, outbound_tx).await;
        info!("Accepting connection from {}, total clients: {}", addr, count);

        tokio::spawn(write_loop(
            Arc::clone(&peer),
            CommandWriter::new(write_half),
            outbound_rx,
            self.config.write_timeout,
        ));

        let reader = CommandReader::with_max_line_len(read_half, self.config.max_line_len);
        Ok((peer, reader))
    }

    /// 单个连接的读取循环，退出时总会调用 remove
    async fn serve(self: Arc<Self>, peer: Arc<Peer>, mut reader: CommandReader<OwnedReadHalf>) {
        let addr = peer.addr();
        let mut closed = peer.closed();

        loop {
            let result = tokio::select! {
                result = reader.read_command() => result,
                _ = wait_closed(&mut closed) => {
                    debug!("Connection {} closed by writer", addr);
                    break;
                }
            };

            match result {
                Ok(Command::Send { message }) => {
                    let command = Command::Message {
                        name: peer.name().await,
                        message,
                    };
                    if let Err(e) = command.validate() {
                        warn!("Dropping message from {}: {}", addr, e);
                        continue;
                    }
                    // 只是入队，慢连接不会拖住这里的读取
                    let queued = self.broadcast(command).await;
                    debug!("Message from {} queued for {} clients", addr, queued);
                }
                Ok(Command::Name { name }) => {
                    if let Err(e) = validate_name(&name) {
                        warn!("Rejecting name from {}: {}", addr, e);
                        continue;
                    }
                    info!("{} is now known as {:?}", addr, name);
                    peer.set_name(name).await;
                }
                Ok(other) => {
                    warn!("Unexpected {} command from {}", other.keyword(), addr);
                }
                Err(ProtocolError::ConnectionClosed) => {
                    debug!("Connection {} reached end of stream", addr);
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Read error from {}: {}", addr, e);
                }
                Err(e) => {
                    warn!("Fatal read error from {}: {}", addr, e);
                    break;
                }
            }
        }

        self.remove(&peer).await;
    }

    /// 移除连接并关闭；已移除的连接再次调用不做任何事
    async fn remove(&self, peer: &Peer) -> bool {
        let Some((removed, remaining)) = self.registry.remove(peer.id()).await else {
            return false;
        };
        info!(
            "Closing connection from {}, remaining clients: {}",
            removed.addr(),
            remaining
        );
        removed.close();
        true
    }

    /// 对当前成员快照逐个入队，单个连接失败不影响其他连接
    async fn broadcast(&self, command: Command) -> usize {
        let peers = self.registry.snapshot().await;

        let mut queued = 0;
        for peer in &peers {
            match peer.enqueue(command.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Outbound queue of {} is full, dropping {} command",
                        peer.addr(),
                        command.keyword()
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Outbound queue of {} is closed", peer.addr());
                }
            }
        }
        queued
    }
}

/// 单个连接的写入循环
///
/// IO 失败或超时会触发关闭信号，读取循环随之退出并移除该连接。
async fn write_loop(
    peer: Arc<Peer>,
    mut writer: CommandWriter<OwnedWriteHalf>,
    mut outbound: mpsc::Receiver<Command>,
    write_timeout: Duration,
) {
    let addr = peer.addr();
    let mut closed = peer.closed();

    loop {
        let command = tokio::select! {
            command = outbound.recv() => match command {
                Some(command) => command,
                None => break,
            },
            _ = wait_closed(&mut closed) => break,
        };

        match timeout(write_timeout, writer.write_command(&command)).await {
            Ok(Ok(())) => {}
            Ok(Err(ProtocolError::Io(e))) => {
                warn!("Failed to send to {}: {}", addr, e);
                peer.close();
                break;
            }
            Ok(Err(e)) => {
                // 编码失败说明命令本身有问题，与这个连接无关
                error!("Skipping {} command for {}: {}", command.keyword(), addr, e);
            }
            Err(_) => {
                warn!("Write to {} timed out after {:?}", addr, write_timeout);
                peer.close();
                break;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} failed: {}", addr, e);
    }
}
