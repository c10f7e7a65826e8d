//! 检视端事件：新日志、日志清空、连接状态变化
//!
//! 广播是尽力而为的：没有订阅者时 send 失败，直接忽略。

use serde::Serialize;
use tokio::sync::broadcast;

use crate::channel::ConnectionStatus;

/// 推送给检视端的事件（JSON 中以 `type` 区分）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    NewLog { message: String },
    LogsCleared,
    WebsocketStatus { status: ConnectionStatus },
}

/// 事件总线：broadcast 发送端的薄包装
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: BridgeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
