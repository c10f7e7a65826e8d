//! 日志环形缓冲
//!
//! 进程内唯一、按时间排序、有界（默认 1000 条）的可读日志，供检视端拉取与订阅。
//! 每条日志同时镜像到 tracing。

use std::collections::VecDeque;
use std::sync::Mutex;

use super::events::{BridgeEvent, EventBus};

/// 有界日志存储：超出容量时先淘汰最旧条目
#[derive(Debug)]
pub struct LogStore {
    entries: Mutex<VecDeque<String>>,
    capacity: usize,
    events: EventBus,
}

impl LogStore {
    pub fn new(capacity: usize, events: EventBus) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            events,
        }
    }

    /// 追加一条 `[HH:MM:SS] message`，截断到容量并广播 new_log
    pub fn log(&self, message: impl AsRef<str>) {
        let entry = format!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            message.as_ref()
        );
        {
            let mut entries = self.lock();
            entries.push_back(entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
        tracing::info!(target: "accessly::log", "{}", entry);
        self.events.publish(BridgeEvent::NewLog { message: entry });
    }

    /// 当前全部日志的副本，最旧在前
    pub fn get_all(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.events.publish(BridgeEvent::LogsCleared);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_timestamp(entry: &str) -> &str {
        // "[HH:MM:SS] " 固定 11 个字符
        &entry[11..]
    }

    #[test]
    fn test_log_format() {
        let store = LogStore::new(10, EventBus::default());
        store.log("hello");
        let logs = store.get_all();
        assert_eq!(logs.len(), 1);
        let entry = &logs[0];
        assert!(entry.starts_with('['));
        assert_eq!(&entry[9..11], "] ");
        assert_eq!(entry[1..9].matches(':').count(), 2);
        assert_eq!(strip_timestamp(entry), "hello");
    }

    #[test]
    fn test_bound_keeps_most_recent_in_order() {
        let store = LogStore::new(1000, EventBus::default());
        for i in 0..1500 {
            store.log(format!("line {}", i));
            assert!(store.len() <= 1000);
        }
        let logs = store.get_all();
        assert_eq!(logs.len(), 1000);
        for (offset, entry) in logs.iter().enumerate() {
            assert_eq!(strip_timestamp(entry), format!("line {}", 500 + offset));
        }
    }

    #[test]
    fn test_get_all_is_a_copy() {
        let store = LogStore::new(10, EventBus::default());
        store.log("a");
        let mut snapshot = store.get_all();
        snapshot.push("injected".to_string());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcasts_new_log_and_clear() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let store = LogStore::new(10, bus);

        store.log("first");
        match rx.recv().await.unwrap() {
            BridgeEvent::NewLog { message } => assert!(message.ends_with("first")),
            other => panic!("unexpected event: {:?}", other),
        }

        store.clear();
        assert!(store.is_empty());
        assert_eq!(rx.recv().await.unwrap(), BridgeEvent::LogsCleared);
    }
}
