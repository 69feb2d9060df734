//! 在线连接注册表

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use protocol::Command;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

/// 连接 ID，按 accept 顺序递增，不会复用
pub type PeerId = u64;

/// 一条在线连接
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    addr: SocketAddr,
    /// 显示昵称，初始为空（匿名）；只有所属连接的读取任务会修改
    name: RwLock<String>,
    /// 发送队列，由该连接的写入任务消费
    outbound: mpsc::Sender<Command>,
    /// 关闭信号
    closed: watch::Sender<bool>,
}

impl Peer {
    fn new(id: PeerId, addr: SocketAddr, outbound: mpsc::Sender<Command>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            addr,
            name: RwLock::new(String::new()),
            outbound,
            closed,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 当前昵称
    pub async fn name(&self) -> String {
        self.name.read().await.clone()
    }

    /// 修改昵称（后写覆盖先写）
    pub async fn set_name(&self, name: String) {
        *self.name.write().await = name;
    }

    /// 非阻塞地把命令放入发送队列
    pub fn enqueue(&self, command: Command) -> Result<(), TrySendError<Command>> {
        self.outbound.try_send(command)
    }

    /// 通知读写任务关闭连接（可重复调用）
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// 订阅关闭信号
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

/// 等待关闭信号；发送端已释放也视为关闭
///
/// `wait_for` 返回的 `Ref` 持有读锁，必须在返回前丢弃。
pub(crate) async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

/// 注册表
///
/// 所有成员变更都在同一把锁内完成，锁内不做任何网络 IO。
#[derive(Debug, Default)]
pub struct Registry {
    peers: Mutex<BTreeMap<PeerId, Arc<Peer>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条新连接，返回该连接以及登记后的在线数
    pub async fn register(
        &self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Command>,
    ) -> (Arc<Peer>, usize) {
        let mut peers = self.peers.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let peer = Arc::new(Peer::new(id, addr, outbound));
        peers.insert(id, Arc::clone(&peer));
        (peer, peers.len())
    }

    /// 移除连接，返回被移除的连接以及剩余在线数；不存在时返回 None
    pub async fn remove(&self, id: PeerId) -> Option<(Arc<Peer>, usize)> {
        let mut peers = self.peers.lock().await;
        let peer = peers.remove(&id)?;
        Some((peer, peers.len()))
    }

    /// 复制当前成员列表，调用方在锁外使用
    pub async fn snapshot(&self) -> Vec<Arc<Peer>> {
        self.peers.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }
}
