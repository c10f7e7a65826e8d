//! 连接管理器：维持到控制端的单条逻辑连接
//!
//! 状态机 IDLE → CONNECTING → OPEN → CLOSED → CONNECTING → …，没有终态：
//! 断开后总是按退避间隔重连，直到进程关闭（shutdown 令牌触发）。
//!
//! - connect() 幂等：正在连接或已连接时直接返回，同一时刻最多一次连接尝试
//! - 入站命令并发分发，结果只在收到命令的那条连接仍打开时回发；连接中途断开则丢弃结果
//! - 保活定时器只是周期性空转，不做任何业务逻辑

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::protocol::{CommandEnvelope, ResultEnvelope};
use super::socket::{Connector, Socket, SocketEvent};
use crate::config::BridgeSection;
use crate::observability::{BridgeEvent, EventBus, LogStore};
use crate::tools::Dispatcher;

/// 连接状态（唯一权威副本由 ConnectionManager 持有）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// 检视端看到的连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatusReport {
    pub connected: bool,
    pub connecting: bool,
}

/// 当前打开的连接
struct Session {
    close: CancellationToken,
}

struct ConnState {
    connecting: bool,
    session: Option<Session>,
    backoff: Backoff,
}

impl ConnState {
    fn status(&self) -> ConnectionStatus {
        if self.session.is_some() {
            ConnectionStatus::Connected
        } else if self.connecting {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

pub struct ConnectionManager {
    url: String,
    keepalive: Duration,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    logs: Arc<LogStore>,
    events: EventBus,
    state: Mutex<ConnState>,
    status_tx: watch::Sender<ConnectionStatus>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        cfg: &BridgeSection,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        logs: Arc<LogStore>,
        events: EventBus,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Arc::new(Self {
            url: cfg.url.clone(),
            keepalive: Duration::from_secs(cfg.keepalive_secs.max(1)),
            connector,
            dispatcher,
            logs,
            events,
            state: Mutex::new(ConnState {
                connecting: false,
                session: None,
                backoff: Backoff::from_config(&cfg.backoff),
            }),
            status_tx,
            shutdown,
        })
    }

    /// 启动保活定时器并发起首次连接
    pub fn start(self: &Arc<Self>) {
        self.spawn_keepalive();
        self.connect();
    }

    /// 发起连接；正在连接或已连接时为 no-op
    pub fn connect(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        {
            let mut state = self.lock();
            if state.connecting || state.session.is_some() {
                return;
            }
            state.connecting = true;
        }
        self.update_status();
        self.logs.log("🔗 Attempting WebSocket connection...");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.connector.connect(&this.url).await {
                Ok(socket) => this.run_session(socket).await,
                Err(e) => {
                    this.logs.log(format!("❌ Failed to create WebSocket: {}", e));
                    this.lock().connecting = false;
                    this.update_status();
                    this.events.publish(BridgeEvent::WebsocketStatus {
                        status: ConnectionStatus::Disconnected,
                    });
                    this.schedule_reconnect();
                }
            }
        });
    }

    /// 连接打开后的接收循环，返回即连接已关闭
    async fn run_session(self: &Arc<Self>, socket: Socket) {
        let Socket {
            outbound,
            mut inbound,
            close,
        } = socket;

        if self.shutdown.is_cancelled() {
            close.cancel();
            self.lock().connecting = false;
            self.update_status();
            return;
        }

        {
            let mut state = self.lock();
            state.connecting = false;
            state.backoff.reset();
            state.session = Some(Session {
                close: close.clone(),
            });
        }
        self.logs.log("✅ WebSocket connected");
        self.update_status();
        self.events.publish(BridgeEvent::WebsocketStatus {
            status: ConnectionStatus::Connected,
        });

        loop {
            tokio::select! {
                biased;
                event = inbound.recv() => match event {
                    Some(SocketEvent::Message(text)) => self.on_message(text, &outbound, &close),
                    Some(SocketEvent::Error(e)) => self.on_error(&e),
                    None => break,
                },
                _ = close.cancelled() => break,
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.on_close(&close);
    }

    /// 解析命令帧并异步分发；非法帧记录后丢弃
    fn on_message(
        self: &Arc<Self>,
        raw: String,
        outbound: &mpsc::UnboundedSender<String>,
        close: &CancellationToken,
    ) {
        let command = match CommandEnvelope::parse(&raw) {
            Ok(command) => command,
            Err(e) => {
                self.logs
                    .log(format!("❌ Error processing WebSocket command: {}", e));
                return;
            }
        };
        self.logs.log(format!(
            "📨 Received WebSocket command: {} ({})",
            command.tool_name.as_deref().unwrap_or("undefined"),
            command.command_id
        ));

        let Some(tool_name) = command.tool_name().map(str::to_string) else {
            self.logs.log("❌ Invalid command - missing toolName");
            return;
        };

        let this = Arc::clone(self);
        let outbound = outbound.clone();
        let close = close.clone();
        tokio::spawn(async move {
            let outcome = this.dispatcher.run_tool(&tool_name, command.parameters).await;
            if close.is_cancelled() {
                tracing::debug!(
                    command_id = %command.command_id,
                    "connection closed before result was ready, dropping"
                );
                return;
            }
            let envelope = ResultEnvelope::new(command.command_id, outcome);
            let success = envelope.success;
            match serde_json::to_string(&envelope) {
                Ok(frame) => {
                    if outbound.send(frame).is_ok() {
                        this.logs.log(format!(
                            "📤 Sent WebSocket response for {}: {}",
                            tool_name,
                            if success { "success" } else { "error" }
                        ));
                    }
                }
                Err(e) => this
                    .logs
                    .log(format!("❌ Error processing WebSocket command: {}", e)),
            }
        });
    }

    /// 传输错误只清除 connecting 标记，随后的关闭事件负责重连
    fn on_error(&self, error: &str) {
        self.logs.log(format!("❌ WebSocket error: {}", error));
        self.lock().connecting = false;
        self.update_status();
    }

    fn on_close(self: &Arc<Self>, close: &CancellationToken) {
        close.cancel();
        {
            let mut state = self.lock();
            state.session = None;
            state.connecting = false;
        }
        self.logs.log("❌ WebSocket disconnected");
        self.update_status();
        self.events.publish(BridgeEvent::WebsocketStatus {
            status: ConnectionStatus::Disconnected,
        });
        self.schedule_reconnect();
    }

    /// 等待当前退避间隔后重连；间隔按倍数增长，只在连接成功时复位
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let delay = self.lock().backoff.next_delay();
        self.logs.log(format!(
            "🔄 Retrying WebSocket in {}s...",
            delay.as_secs_f64()
        ));

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => this.connect(),
                _ = this.shutdown.cancelled() => {}
            }
        });
    }

    /// 外部触发重连：关闭当前连接，走正常的关闭 → 重连路径
    pub fn force_reconnect(&self) {
        self.logs.log("🔄 Force reconnect triggered...");
        if let Some(session) = self.lock().session.as_ref() {
            session.close.cancel();
        }
    }

    pub fn status(&self) -> ConnectionStatusReport {
        let state = self.lock();
        ConnectionStatusReport {
            connected: state.session.is_some(),
            connecting: state.connecting,
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.lock().status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// 保活：周期性空转，防止宿主挂起进程
    fn spawn_keepalive(&self) {
        let period = self.keepalive;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tracing::trace!("keep-alive"),
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    fn update_status(&self) {
        let status = self.lock().status();
        self.status_tx.send_replace(status);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BridgeError;
    use crate::observability::ExecutionLedger;
    use crate::tools::{PingTool, ToolRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 连接请求永远挂起，用于观察 CONNECTING 状态
    struct HangingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(&self, _url: &str) -> Result<Socket, BridgeError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<Socket, BridgeError>>().await
        }
    }

    fn manager(connector: Arc<dyn Connector>) -> Arc<ConnectionManager> {
        let events = EventBus::default();
        let logs = Arc::new(LogStore::new(100, events.clone()));
        let mut registry = ToolRegistry::new();
        registry.register(PingTool);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            Arc::clone(&logs),
            Arc::new(ExecutionLedger::new(10)),
        ));
        ConnectionManager::new(
            &BridgeSection::default(),
            connector,
            dispatcher,
            logs,
            events,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_connecting() {
        let connector = Arc::new(HangingConnector {
            attempts: AtomicUsize::new(0),
        });
        let manager = manager(connector.clone());
        assert_eq!(manager.connection_status(), ConnectionStatus::Disconnected);

        for _ in 0..5 {
            manager.connect();
        }
        tokio::task::yield_now().await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.connection_status(), ConnectionStatus::Connecting);
        assert_eq!(
            manager.status(),
            ConnectionStatusReport {
                connected: false,
                connecting: true
            }
        );
    }

    #[tokio::test]
    async fn test_force_reconnect_without_session_is_harmless() {
        let manager = manager(Arc::new(HangingConnector {
            attempts: AtomicUsize::new(0),
        }));
        manager.force_reconnect();
        assert_eq!(manager.connection_status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_status_json() {
        let report = ConnectionStatusReport {
            connected: true,
            connecting: false,
        };
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            serde_json::json!({ "connected": true, "connecting": false })
        );
    }
}
