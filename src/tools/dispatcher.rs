//! 工具分发器
//!
//! run_tool(name, params) 按名查找工具并执行，把成功 / 工具错误 / 未找到 / panic / 超时
//! 统一成 `{ success, result?, error? }`，任何失败都不会越过分发器边界。
//! 每次调用写一行日志缓冲（图片 / 音频 data URI 只记大小），并输出结构化审计日志（JSON）。
//!
//! run_tracked 是追踪通道（伴侣进程的请求 / 响应通道）的入口：在 run_tool 之外额外写执行台账。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::BridgeError;
use crate::observability::{ExecutionLedger, ExecutionRecord, LogStore};
use crate::tools::ToolRegistry;

/// 分发结果：success 即 `error.is_none()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// 追踪执行请求：`{ toolName, parameters?, executionId? }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

/// 追踪执行响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResponse {
    pub success: bool,
    pub execution_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// 工具分发器：持有注册表、日志缓冲、执行台账与可选超时
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    logs: Arc<LogStore>,
    ledger: Arc<ExecutionLedger>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        logs: Arc<LogStore>,
        ledger: Arc<ExecutionLedger>,
    ) -> Self {
        Self {
            registry,
            logs,
            ledger,
            timeout: None,
        }
    }

    /// 设置单次调用超时；默认不设（命令可以永不完成）
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具；params 缺省为空对象
    pub async fn run_tool(&self, tool_name: &str, params: Option<Value>) -> ToolOutcome {
        let params = params.unwrap_or_else(|| Value::Object(Default::default()));
        self.logs
            .log(format!("🔧 Executing tool: {} with params: {}", tool_name, params));

        let start = Instant::now();
        let args_preview = args_preview(&params);
        let invoked = self.invoke(tool_name, params).await;

        let outcome_label = match &invoked {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(BridgeError::ToolTimeout(_)) => "timeout",
            Err(_) => "failed",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome_label == "ok",
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match invoked {
            Ok(Ok(result)) => {
                match summarize(&result) {
                    Some(summary) => self
                        .logs
                        .log(format!("✅ Tool result for {}: {}", tool_name, summary)),
                    None => self.logs.log(format!("✅ Tool completed: {}", tool_name)),
                }
                ToolOutcome::ok(result)
            }
            Ok(Err(error)) => {
                self.logs
                    .log(format!("❌ Tool error for {}: {}", tool_name, error));
                ToolOutcome::err(error)
            }
            Err(e) => {
                self.logs
                    .log(format!("❌ Tool execution failed for {}: {}", tool_name, e));
                ToolOutcome::err(e.to_string())
            }
        }
    }

    /// 查找并在独立任务中执行工具，panic 与超时转为 BridgeError
    async fn invoke(
        &self,
        tool_name: &str,
        params: Value,
    ) -> Result<Result<Value, String>, BridgeError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| BridgeError::ToolNotFound(tool_name.to_string()))?;

        let mut handle = tokio::spawn(async move { tool.execute(params).await });
        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(BridgeError::ToolTimeout(tool_name.to_string()));
                }
            },
            None => handle.await,
        };

        joined.map_err(|e| {
            if e.is_panic() {
                BridgeError::ToolPanicked(tool_name.to_string())
            } else {
                BridgeError::ToolAborted(tool_name.to_string())
            }
        })
    }

    /// 追踪通道执行：校验工具名、生成执行 ID、执行并写入台账
    pub async fn run_tracked(
        &self,
        request: ToolExecutionRequest,
    ) -> Result<ToolExecutionResponse, BridgeError> {
        let tool_name = request
            .tool_name
            .filter(|name| !name.is_empty())
            .ok_or(BridgeError::MissingField("toolName"))?;

        if !self.registry.contains(&tool_name) {
            return Err(BridgeError::ToolNotAvailable {
                name: tool_name,
                available: self.registry.tool_names().join(", "),
            });
        }

        let execution_id = request.execution_id.unwrap_or_else(new_execution_id);
        let parameters = request
            .parameters
            .unwrap_or_else(|| Value::Object(Default::default()));
        tracing::info!(tool = %tool_name, execution_id = %execution_id, "tracked execution");

        let start_time = chrono::Utc::now().timestamp_millis();
        let started = Instant::now();
        let outcome = self.run_tool(&tool_name, Some(parameters.clone())).await;
        let duration = started.elapsed().as_millis() as u64;
        let end_time = chrono::Utc::now().timestamp_millis();

        self.ledger.record(ExecutionRecord {
            id: execution_id.clone(),
            tool_name: tool_name.clone(),
            parameters,
            success: outcome.success,
            result: outcome.result.clone(),
            error: outcome.error.clone(),
            start_time,
            end_time,
            duration,
        });

        if outcome.success {
            tracing::info!("Tool '{}' executed successfully in {}ms", tool_name, duration);
        } else {
            tracing::warn!(
                "Tool '{}' failed: {}",
                tool_name,
                outcome.error.as_deref().unwrap_or("")
            );
        }

        Ok(ToolExecutionResponse {
            success: outcome.success,
            execution_id,
            tool_name,
            result: outcome.result,
            error: outcome.error,
            timestamp: end_time,
            duration: Some(duration),
        })
    }
}

/// `exec_<毫秒>_<9 位随机>`
fn new_execution_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "exec_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        &random[..9]
    )
}

/// 日志用结果摘要；图片 / 音频 data URI 只记近似大小，空结果返回 None
fn summarize(result: &Value) -> Option<String> {
    match result {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) if s.starts_with("data:image") => {
            Some(format!("Screenshot captured ({}KB)", approx_kb(s)))
        }
        Value::String(s) if s.starts_with("data:audio") => {
            Some(format!("Audio captured ({}KB)", approx_kb(s)))
        }
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn approx_kb(s: &str) -> u64 {
    (s.len() as f64 / 1024.0).round() as u64
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
