//! 执行台账：经追踪通道执行的每条命令的有界记录
//!
//! 以执行 ID 为键，按插入顺序淘汰（不是按访问顺序），容量默认 1000。
//! 记录只在执行完成后一次性插入，插入后不可变（淘汰除外）。
//!
//! 工具维度的平均耗时用增量均值 `(old * (n-1) + d) / n` 计算，不单独保存样本；
//! 某工具的记录被全局容量淘汰后，这部分精度随之丢失。

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LedgerSection;
use crate::core::BridgeError;

const RECENT_FAILURES: usize = 10;
const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// 单次执行记录（JSON 字段为 camelCase，时间为毫秒时间戳）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub tool_name: String,
    pub parameters: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub total: usize,
    pub history: Vec<ExecutionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub overview: StatsOverview,
    pub by_tool: BTreeMap<String, ToolUsage>,
    pub recent_failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsOverview {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_duration: u64,
    pub last_24h: usize,
    pub last_hour: usize,
}

/// 单个工具的使用统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsage {
    pub count: usize,
    pub success: usize,
    pub avg_duration: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub tool: String,
    pub error: Option<String>,
    pub timestamp: i64,
    pub parameters: Value,
}

/// 最近窗口内的健康分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub recent_executions: usize,
    pub recent_failures: usize,
    pub recent_success_rate: f64,
    pub memory_usage: MemoryUsage,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryUsage {
    pub stored_executions: usize,
    pub max_capacity: usize,
    pub usage_percentage: f64,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, ExecutionRecord>,
    /// 插入顺序，队首最旧
    order: VecDeque<String>,
}

/// 有界执行台账
pub struct ExecutionLedger {
    inner: Mutex<Inner>,
    capacity: usize,
    history_limit: usize,
    health_window_ms: i64,
    warning_failure_ratio: f64,
}

impl ExecutionLedger {
    pub fn new(capacity: usize) -> Self {
        Self::from_config(&LedgerSection {
            capacity,
            ..LedgerSection::default()
        })
    }

    pub fn from_config(cfg: &LedgerSection) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: cfg.capacity,
            history_limit: cfg.history_limit,
            health_window_ms: (cfg.health_window_secs * 1000) as i64,
            warning_failure_ratio: cfg.warning_failure_ratio,
        }
    }

    /// 插入记录；同一 ID 重复记录时原位替换，不改变淘汰顺序
    pub fn record(&self, entry: ExecutionRecord) {
        let mut inner = self.lock();
        let id = entry.id.clone();
        if inner.records.insert(id.clone(), entry).is_none() {
            inner.order.push_back(id);
        }
        while inner.records.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.records.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// 按开始时间倒序，截取前 limit 条（默认 50）
    pub fn history(&self, limit: Option<usize>) -> HistoryReport {
        let mut history = self.snapshot();
        let total = history.len();
        history.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        history.truncate(limit.unwrap_or(self.history_limit));
        HistoryReport { total, history }
    }

    pub fn stats(&self) -> StatsReport {
        self.stats_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn stats_at(&self, now_ms: i64) -> StatsReport {
        let executions = self.snapshot();
        let total = executions.len();
        let successful = executions.iter().filter(|e| e.success).count();
        let failed = total - successful;
        let avg_duration = if total > 0 {
            executions.iter().map(|e| e.duration as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };

        let mut by_tool: BTreeMap<String, ToolUsage> = BTreeMap::new();
        for exec in &executions {
            let usage = by_tool.entry(exec.tool_name.clone()).or_default();
            usage.count += 1;
            if exec.success {
                usage.success += 1;
            }
            let n = usage.count as f64;
            usage.avg_duration = (usage.avg_duration * (n - 1.0) + exec.duration as f64) / n;
        }
        for usage in by_tool.values_mut() {
            usage.success_rate = percentage(usage.success, usage.count, 0.0);
        }

        let mut failures: Vec<&ExecutionRecord> =
            executions.iter().filter(|e| !e.success).collect();
        failures.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        let recent_failures = failures
            .into_iter()
            .take(RECENT_FAILURES)
            .map(|e| FailureSummary {
                tool: e.tool_name.clone(),
                error: e.error.clone(),
                timestamp: e.start_time,
                parameters: e.parameters.clone(),
            })
            .collect();

        StatsReport {
            overview: StatsOverview {
                total,
                successful,
                failed,
                success_rate: percentage(successful, total, 0.0),
                avg_duration: avg_duration.round() as u64,
                last_24h: executions.iter().filter(|e| e.start_time > now_ms - DAY_MS).count(),
                last_hour: executions.iter().filter(|e| e.start_time > now_ms - HOUR_MS).count(),
            },
            by_tool,
            recent_failures,
        }
    }

    /// 点查；不存在返回 None（不是错误）
    pub fn get(&self, id: &str) -> Option<ExecutionRecord> {
        self.lock().records.get(id).cloned()
    }

    /// 清空台账，返回清除条数
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let cleared = inner.records.len();
        inner.records.clear();
        inner.order.clear();
        cleared
    }

    pub fn health(&self) -> HealthReport {
        self.health_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn health_at(&self, now_ms: i64) -> HealthReport {
        let (recent, stored) = {
            let inner = self.lock();
            let recent: Vec<bool> = inner
                .records
                .values()
                .filter(|e| e.start_time > now_ms - self.health_window_ms)
                .map(|e| e.success)
                .collect();
            (recent, inner.records.len())
        };
        let recent_success = recent.iter().filter(|ok| **ok).count();
        let recent_failures = recent.len() - recent_success;

        let status = if recent_failures == 0 {
            HealthStatus::Healthy
        } else if (recent_failures as f64) < recent.len() as f64 * self.warning_failure_ratio {
            HealthStatus::Warning
        } else {
            HealthStatus::Error
        };

        HealthReport {
            status,
            recent_executions: recent.len(),
            recent_failures,
            recent_success_rate: percentage(recent_success, recent.len(), 100.0),
            memory_usage: MemoryUsage {
                stored_executions: stored,
                max_capacity: self.capacity,
                usage_percentage: percentage(stored, self.capacity, 0.0),
            },
            timestamp: now_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 执行状态查询（history / stats / get / clear / health）
    pub fn query(&self, request: &ToolStatusRequest) -> Result<StatusReply, BridgeError> {
        let action: ToolStatusAction = request.action.parse()?;
        let reply = match action {
            ToolStatusAction::History => {
                StatusReply::new("Tool execution history retrieved", &self.history(request.limit))?
            }
            ToolStatusAction::Stats => {
                StatusReply::new("Tool execution statistics retrieved", &self.stats())?
            }
            ToolStatusAction::Get => {
                let id = request
                    .execution_id
                    .as_deref()
                    .ok_or(BridgeError::MissingField("executionId"))?;
                match self.get(id) {
                    Some(record) => StatusReply::new("Execution details retrieved", &record)?,
                    None => StatusReply {
                        result: "Execution not found".to_string(),
                        data: Value::Null,
                    },
                }
            }
            ToolStatusAction::Clear => {
                let cleared = self.clear();
                StatusReply {
                    result: format!("Cleared {} execution records", cleared),
                    data: serde_json::json!({ "cleared": cleared }),
                }
            }
            ToolStatusAction::Health => StatusReply::new("System health status", &self.health())?,
        };
        Ok(reply)
    }

    /// 按插入顺序复制全部记录
    fn snapshot(&self) -> Vec<ExecutionRecord> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn percentage(part: usize, whole: usize, empty: f64) -> f64 {
    if whole > 0 {
        part as f64 * 100.0 / whole as f64
    } else {
        empty
    }
}

/// 状态查询动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatusAction {
    History,
    Stats,
    Get,
    Clear,
    Health,
}

impl FromStr for ToolStatusAction {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "history" => Ok(Self::History),
            "stats" => Ok(Self::Stats),
            "get" => Ok(Self::Get),
            "clear" => Ok(Self::Clear),
            "health" => Ok(Self::Health),
            other => Err(BridgeError::UnknownAction(other.to_string())),
        }
    }
}

/// 状态查询请求：`{ action, executionId?, limit? }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatusRequest {
    pub action: String,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// 状态查询回复：摘要文本 + 数据
#[derive(Debug, Clone, Serialize)]
pub struct StatusReply {
    pub result: String,
    pub data: Value,
}

impl StatusReply {
    fn new(result: &str, data: &impl Serialize) -> Result<Self, BridgeError> {
        Ok(Self {
            result: result.to_string(),
            data: serde_json::to_value(data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, tool: &str, success: bool, start: i64, duration: u64) -> ExecutionRecord {
        ExecutionRecord {
            id: id.to_string(),
            tool_name: tool.to_string(),
            parameters: json!({ "n": id }),
            success,
            result: success.then(|| json!("ok")),
            error: (!success).then(|| "boom".to_string()),
            start_time: start,
            end_time: start + duration as i64,
            duration,
        }
    }

    #[test]
    fn test_eviction_is_insertion_ordered() {
        let ledger = ExecutionLedger::new(1000);
        let n = 1500;
        for i in 1..=n {
            ledger.record(rec(&format!("e{}", i), "x", true, i, 1));
            assert!(ledger.len() <= 1000);
        }
        assert_eq!(ledger.len(), 1000);
        assert!(ledger.get("e500").is_none());
        for i in (n - 999)..=n {
            assert!(ledger.get(&format!("e{}", i)).is_some(), "missing e{}", i);
        }
    }

    #[test]
    fn test_eviction_ignores_access_recency() {
        let ledger = ExecutionLedger::new(2);
        ledger.record(rec("a", "x", true, 1, 1));
        ledger.record(rec("b", "x", true, 2, 1));
        assert!(ledger.get("a").is_some());
        ledger.record(rec("c", "x", true, 3, 1));
        assert!(ledger.get("a").is_none());
        assert!(ledger.get("b").is_some());
    }

    #[test]
    fn test_rerecord_replaces_in_place() {
        let ledger = ExecutionLedger::new(2);
        ledger.record(rec("a", "x", true, 1, 1));
        ledger.record(rec("b", "x", true, 2, 1));
        ledger.record(rec("a", "x", false, 1, 9));
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.get("a").unwrap().success);
        ledger.record(rec("c", "x", true, 3, 1));
        assert!(ledger.get("a").is_none());
    }

    #[test]
    fn test_history_sorted_and_limited() {
        let ledger = ExecutionLedger::new(100);
        for i in 0..60 {
            ledger.record(rec(&format!("e{}", i), "x", true, i, 1));
        }
        let report = ledger.history(None);
        assert_eq!(report.total, 60);
        assert_eq!(report.history.len(), 50);
        assert_eq!(report.history[0].id, "e59");
        assert_eq!(report.history[49].id, "e10");
        assert_eq!(ledger.history(Some(3)).history.len(), 3);
    }

    #[test]
    fn test_stats_running_average() {
        let ledger = ExecutionLedger::new(100);
        let now = 1_000_000;
        ledger.record(rec("1", "x", true, now - 30, 10));
        ledger.record(rec("2", "x", true, now - 20, 20));
        ledger.record(rec("3", "x", false, now - 10, 30));
        ledger.record(rec("4", "y", true, now - 5, 100));

        let stats = ledger.stats_at(now);
        let x = &stats.by_tool["x"];
        assert_eq!(x.count, 3);
        assert_eq!(x.success, 2);
        assert_eq!(x.avg_duration, 20.0);
        assert!((x.success_rate - 66.666).abs() < 0.01);

        assert_eq!(stats.overview.total, 4);
        assert_eq!(stats.overview.failed, 1);
        assert_eq!(stats.overview.avg_duration, 40);
        assert_eq!(stats.overview.last_hour, 4);
        assert_eq!(stats.recent_failures.len(), 1);
        assert_eq!(stats.recent_failures[0].tool, "x");
        assert_eq!(stats.recent_failures[0].parameters, json!({ "n": "3" }));

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_tool"]["x"]["avgDuration"], 20.0);
    }

    #[test]
    fn test_recent_failures_capped_at_ten() {
        let ledger = ExecutionLedger::new(100);
        for i in 0..15 {
            ledger.record(rec(&format!("f{}", i), "x", false, i, 1));
        }
        let stats = ledger.stats_at(100);
        assert_eq!(stats.recent_failures.len(), 10);
        assert_eq!(stats.recent_failures[0].timestamp, 14);
    }

    #[test]
    fn test_health_classification() {
        let now = 10_000_000;
        let ledger = ExecutionLedger::new(100);
        assert_eq!(ledger.health_at(now).status, HealthStatus::Healthy);
        assert_eq!(ledger.health_at(now).recent_success_rate, 100.0);

        for i in 0..9 {
            ledger.record(rec(&format!("ok{}", i), "x", true, now - 1000, 1));
        }
        ledger.record(rec("bad", "x", false, now - 1000, 1));
        // 1/10 < 20%
        assert_eq!(ledger.health_at(now).status, HealthStatus::Warning);

        ledger.record(rec("bad2", "x", false, now - 1000, 1));
        ledger.record(rec("bad3", "x", false, now - 1000, 1));
        // 3/12 >= 20%
        let report = ledger.health_at(now);
        assert_eq!(report.status, HealthStatus::Error);
        assert_eq!(report.recent_executions, 12);
        assert_eq!(report.memory_usage.stored_executions, 12);
        assert_eq!(report.memory_usage.usage_percentage, 12.0);
    }

    #[test]
    fn test_health_ignores_old_executions() {
        let now = 10_000_000;
        let ledger = ExecutionLedger::new(100);
        ledger.record(rec("old", "x", false, now - 6 * 60 * 1000, 1));
        let report = ledger.health_at(now);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.recent_executions, 0);
        assert_eq!(report.memory_usage.stored_executions, 1);
    }

    #[test]
    fn test_query_actions() {
        let ledger = ExecutionLedger::new(10);
        ledger.record(rec("a", "x", true, 1, 1));

        let req = |action: &str, id: Option<&str>| ToolStatusRequest {
            action: action.to_string(),
            execution_id: id.map(str::to_string),
            limit: None,
        };

        let reply = ledger.query(&req("get", Some("a"))).unwrap();
        assert_eq!(reply.data["toolName"], "x");

        let reply = ledger.query(&req("get", Some("missing"))).unwrap();
        assert_eq!(reply.result, "Execution not found");
        assert!(reply.data.is_null());

        assert!(matches!(
            ledger.query(&req("get", None)),
            Err(BridgeError::MissingField("executionId"))
        ));
        assert!(matches!(
            ledger.query(&req("explode", None)),
            Err(BridgeError::UnknownAction(_))
        ));

        let reply = ledger.query(&req("clear", None)).unwrap();
        assert_eq!(reply.result, "Cleared 1 execution records");
        assert_eq!(reply.data["cleared"], 1);
        assert!(ledger.is_empty());
    }
}
