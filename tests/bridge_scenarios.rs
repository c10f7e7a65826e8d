//! 命令通道端到端场景：mock 连接器 + 暂停的 tokio 时钟（退避等待是虚拟时间）

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use accessly::channel::{ConnectionStatus, Connector, Socket, SocketEvent};
use accessly::config::AppConfig;
use accessly::tools::{PingTool, Tool, ToolRegistry};
use accessly::{BridgeContext, BridgeError};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// 测试侧持有的连接另一端
struct Peer {
    to_bridge: mpsc::UnboundedSender<SocketEvent>,
    from_bridge: mpsc::UnboundedReceiver<String>,
    close: CancellationToken,
}

impl Peer {
    fn send(&self, frame: Value) {
        self.to_bridge
            .send(SocketEvent::Message(frame.to_string()))
            .unwrap();
    }

    async fn recv(&mut self) -> Option<Value> {
        self.from_bridge
            .recv()
            .await
            .map(|frame| serde_json::from_str(&frame).unwrap())
    }
}

/// 前 fail_first 次连接失败，之后每次连接都把对端交给测试
struct MockConnector {
    attempts: AtomicUsize,
    fail_first: usize,
    peers: mpsc::UnboundedSender<Peer>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Socket, BridgeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(BridgeError::Connect("connection refused".to_string()));
        }
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let close = CancellationToken::new();
        let _ = self.peers.send(Peer {
            to_bridge: in_tx,
            from_bridge: out_rx,
            close: close.clone(),
        });
        Ok(Socket {
            outbound: out_tx,
            inbound: in_rx,
            close,
        })
    }
}

/// 等待 release 通知后才返回的工具
struct GatedTool {
    gate: Arc<Notify>,
}

#[async_trait]
impl Tool for GatedTool {
    fn name(&self) -> &str {
        "gated"
    }

    fn description(&self) -> &str {
        "waits for the test to release it"
    }

    async fn execute(&self, _params: Value) -> Result<Value, String> {
        self.gate.notified().await;
        Ok(json!("late"))
    }
}

struct Harness {
    ctx: BridgeContext,
    connector: Arc<MockConnector>,
    peers: Arc<Mutex<mpsc::UnboundedReceiver<Peer>>>,
    gate: Arc<Notify>,
}

impl Harness {
    fn new(fail_first: usize) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector {
            attempts: AtomicUsize::new(0),
            fail_first,
            peers: peers_tx,
        });
        let gate = Arc::new(Notify::new());
        let mut registry = ToolRegistry::new();
        registry.register(PingTool);
        registry.register(GatedTool {
            gate: Arc::clone(&gate),
        });
        let ctx =
            BridgeContext::with_parts(AppConfig::default(), registry, connector.clone()).unwrap();
        Self {
            ctx,
            connector,
            peers: Arc::new(Mutex::new(peers_rx)),
            gate,
        }
    }

    async fn next_peer(&self) -> Peer {
        self.peers.lock().await.recv().await.unwrap()
    }

    async fn wait_for(&self, status: ConnectionStatus) {
        let mut rx = self.ctx.connection.subscribe_status();
        rx.wait_for(|s| *s == status).await.unwrap();
    }

    fn retry_logs(&self) -> Vec<String> {
        self.ctx
            .logs
            .get_all()
            .into_iter()
            .filter_map(|line| {
                line.split_once("🔄 Retrying WebSocket in ")
                    .map(|(_, rest)| rest.to_string())
            })
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn ping_round_trips_command_id() {
    let h = Harness::new(0);
    h.ctx.connection.connect();
    let mut peer = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;

    peer.send(json!({ "commandId": "a1", "toolName": "ping", "parameters": {} }));
    assert_eq!(
        peer.recv().await.unwrap(),
        json!({ "commandId": "a1", "success": true, "result": "pong" })
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_tool_gets_error_reply() {
    let h = Harness::new(0);
    h.ctx.connection.connect();
    let mut peer = h.next_peer().await;

    peer.send(json!({ "commandId": "a2", "toolName": "doesNotExist" }));
    assert_eq!(
        peer.recv().await.unwrap(),
        json!({ "commandId": "a2", "success": false, "error": "Tool 'doesNotExist' not found." })
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped_without_reply() {
    let h = Harness::new(0);
    h.ctx.connection.connect();
    let mut peer = h.next_peer().await;

    peer.to_bridge
        .send(SocketEvent::Message("{not json".to_string()))
        .unwrap();
    peer.send(json!({ "commandId": "m1" }));
    peer.send(json!({ "commandId": "m2", "toolName": "ping" }));

    // 只有合法的 m2 得到回复
    assert_eq!(peer.recv().await.unwrap()["commandId"], "m2");
    let logs = h.ctx.logs.get_all();
    assert!(logs.iter().any(|l| l.contains("❌ Error processing WebSocket command")));
    assert!(logs.iter().any(|l| l.ends_with("❌ Invalid command - missing toolName")));
    assert_eq!(h.ctx.connection.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn result_is_dropped_when_socket_closes_mid_flight() {
    let h = Harness::new(0);
    h.ctx.connection.connect();
    let mut peer = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;

    peer.send(json!({ "commandId": "a3", "toolName": "gated" }));
    // 等到工具确实开始执行
    while !h.ctx.logs.get_all().iter().any(|l| l.contains("Executing tool: gated")) {
        tokio::task::yield_now().await;
    }

    // 控制端断开
    let Peer {
        to_bridge,
        mut from_bridge,
        ..
    } = peer;
    drop(to_bridge);
    h.wait_for(ConnectionStatus::Disconnected).await;

    h.gate.notify_one();
    // 所有出站发送端都释放后通道关闭，期间没有任何帧
    assert_eq!(from_bridge.recv().await, None);
    assert!(h
        .ctx
        .logs
        .get_all()
        .iter()
        .any(|l| l.ends_with("✅ Tool result for gated: late")));
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent_once_open() {
    let h = Harness::new(0);
    h.ctx.connection.connect();
    let _peer = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;

    for _ in 0..5 {
        h.ctx.connection.connect();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_until_open_then_resets() {
    let h = Harness::new(3);
    h.ctx.connection.connect();
    let peer = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;

    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(h.retry_logs(), vec!["5s...", "7.5s...", "11.25s..."]);

    // 连接成功后断开，下一次间隔回到 5s
    peer.close.cancel();
    h.wait_for(ConnectionStatus::Disconnected).await;
    assert_eq!(h.retry_logs().last().map(String::as_str), Some("5s..."));

    let _again = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn force_reconnect_closes_and_reopens() {
    let h = Harness::new(0);
    let mut events = h.ctx.events.subscribe();
    h.ctx.connection.connect();
    let first = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;

    h.ctx.connection.force_reconnect();
    h.wait_for(ConnectionStatus::Disconnected).await;
    assert!(first.close.is_cancelled());

    let _second = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 2);

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let accessly::observability::BridgeEvent::WebsocketStatus { status } = event {
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connected
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_reconnecting() {
    let h = Harness::new(usize::MAX);
    h.ctx.connection.connect();
    while h.retry_logs().is_empty() {
        tokio::task::yield_now().await;
    }
    h.ctx
        .shutdown
        .shutdown(accessly::core::ShutdownReason::UserInitiated);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_error_does_not_reconnect_by_itself() {
    let h = Harness::new(0);
    h.ctx.connection.connect();
    let mut peer = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;

    peer.to_bridge
        .send(SocketEvent::Error("Transport error: connection reset".to_string()))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.ctx.connection.connection_status(), ConnectionStatus::Connected);
    assert!(h
        .ctx
        .logs
        .get_all()
        .iter()
        .any(|l| l.ends_with("❌ WebSocket error: Transport error: connection reset")));
    assert!(h.retry_logs().is_empty());

    // 会话仍在服务
    peer.send(json!({ "commandId": "e1", "toolName": "ping" }));
    assert_eq!(peer.recv().await.unwrap()["result"], "pong");
}

#[tokio::test(start_paused = true)]
async fn refused_connect_publishes_disconnected() {
    let h = Harness::new(1);
    let mut events = h.ctx.events.subscribe();
    h.ctx.connection.connect();
    let _peer = h.next_peer().await;
    h.wait_for(ConnectionStatus::Connected).await;

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let accessly::observability::BridgeEvent::WebsocketStatus { status } = event {
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![ConnectionStatus::Disconnected, ConnectionStatus::Connected]
    );
}
