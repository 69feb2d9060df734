//! 服务端与客户端库的端到端测试

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_client::{ChatClient, ChatMessage};
use chat_server::{ChatServer, ServerConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct TestClient {
    client: Arc<ChatClient>,
    incoming: mpsc::Receiver<ChatMessage>,
    reader: JoinHandle<protocol::Result<()>>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let client = Arc::new(ChatClient::dial(&addr.to_string()).await.unwrap());
        let incoming = client.incoming().await.unwrap();
        let runner = Arc::clone(&client);
        let reader = tokio::spawn(async move { runner.start().await });
        Self {
            client,
            incoming,
            reader,
        }
    }

    async fn next(&mut self) -> ChatMessage {
        timeout(WAIT, self.incoming.recv()).await.unwrap().unwrap()
    }
}

async fn start_server() -> (Arc<ChatServer>, SocketAddr) {
    let server = Arc::new(ChatServer::new(ServerConfig::default()));
    let addr = server.listen("127.0.0.1:0").await.unwrap();
    let runner = Arc::clone(&server);
    tokio::spawn(async move { runner.start().await });
    (server, addr)
}

async fn wait_for_peers(server: &ChatServer, expected: usize) {
    timeout(WAIT, async {
        while server.peer_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

fn message(name: &str, text: &str) -> ChatMessage {
    ChatMessage {
        name: name.to_string(),
        message: text.to_string(),
    }
}

#[tokio::test]
async fn test_send_reaches_everyone_including_sender() {
    let (server, addr) = start_server().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    let mut c = TestClient::connect(addr).await;
    wait_for_peers(&server, 3).await;

    a.client.set_name("alice").await.unwrap();
    a.client.send_message("hello").await.unwrap();

    let expected = message("alice", "hello");
    assert_eq!(a.next().await, expected);
    assert_eq!(b.next().await, expected);
    assert_eq!(c.next().await, expected);
}

#[tokio::test]
async fn test_messages_from_one_sender_keep_order() {
    let (server, addr) = start_server().await;
    let a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_peers(&server, 2).await;

    a.client.set_name("alice").await.unwrap();
    for i in 0..10 {
        a.client.send_message(&format!("line {}", i)).await.unwrap();
    }
    for i in 0..10 {
        assert_eq!(b.next().await, message("alice", &format!("line {}", i)));
    }
}

#[tokio::test]
async fn test_rename_mid_session() {
    let (server, addr) = start_server().await;
    let a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_peers(&server, 2).await;

    a.client.send_message("first").await.unwrap();
    a.client.set_name("alice").await.unwrap();
    a.client.send_message("second").await.unwrap();
    a.client.set_name("al").await.unwrap();
    a.client.send_message("third").await.unwrap();

    assert_eq!(b.next().await, message("", "first"));
    assert_eq!(b.next().await, message("alice", "second"));
    assert_eq!(b.next().await, message("al", "third"));
}

#[tokio::test]
async fn test_disconnected_client_is_removed() {
    let (server, addr) = start_server().await;
    let mut a = TestClient::connect(addr).await;
    let b = TestClient::connect(addr).await;
    let mut c = TestClient::connect(addr).await;
    wait_for_peers(&server, 3).await;

    b.client.close().await;
    timeout(WAIT, b.reader).await.unwrap().unwrap().unwrap();
    drop(b.client);
    wait_for_peers(&server, 2).await;

    c.client.set_name("carol").await.unwrap();
    c.client.send_message("still here?").await.unwrap();

    let expected = message("carol", "still here?");
    assert_eq!(a.next().await, expected);
    assert_eq!(c.next().await, expected);
}

#[tokio::test]
async fn test_server_broadcast() {
    let (server, addr) = start_server().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_peers(&server, 2).await;

    let queued = server
        .broadcast(protocol::Command::Message {
            name: "server".to_string(),
            message: "maintenance soon".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(queued, 2);

    let expected = message("server", "maintenance soon");
    assert_eq!(a.next().await, expected);
    assert_eq!(b.next().await, expected);
}

#[tokio::test]
async fn test_slow_consumer_does_not_block_others() {
    let (server, addr) = start_server().await;
    // slow 从不读取 incoming，读取循环会停在投递上
    let _slow = TestClient::connect(addr).await;
    let sender = TestClient::connect(addr).await;
    let mut fast = TestClient::connect(addr).await;
    wait_for_peers(&server, 3).await;

    sender.client.set_name("bob").await.unwrap();
    for i in 0..20 {
        sender
            .client
            .send_message(&format!("msg {}", i))
            .await
            .unwrap();
    }
    for i in 0..20 {
        assert_eq!(fast.next().await, message("bob", &format!("msg {}", i)));
    }
}

#[tokio::test]
async fn test_close_keeps_existing_connections() {
    let (server, addr) = start_server().await;
    let mut a = TestClient::connect(addr).await;
    wait_for_peers(&server, 1).await;

    server.close();
    // accept 循环退出后监听端口随之释放
    timeout(WAIT, async {
        while ChatClient::dial(&addr.to_string()).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    a.client.send_message("after close").await.unwrap();
    assert_eq!(a.next().await, message("", "after close"));
}
