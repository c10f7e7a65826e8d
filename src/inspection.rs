//! 检视端控制面：查询连接状态、强制重连、拉取 / 清空日志、经同一分发器执行工具
//!
//! 请求与回复都是 JSON（请求以 `type` 区分）。检视端拿到的永远是副本或快照，不持有内部状态的引用。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::channel::ConnectionManager;
use crate::core::BridgeContext;
use crate::observability::ledger::ToolStatusRequest;
use crate::observability::{BridgeEvent, EventBus, ExecutionLedger, LogStore};
use crate::tools::{command_schema, Dispatcher, ToolExecutionRequest};

/// run_tool 的载荷
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunToolPayload {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// 检视端请求
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InspectionRequest {
    GetWebsocketStatus,
    ForceWebsocketReconnect,
    GetLogs,
    ClearLogs,
    RunTool { payload: RunToolPayload },
    GetTools,
    ToolStatus(ToolStatusRequest),
    RunTrackedTool { payload: ToolExecutionRequest },
}

pub struct Inspector {
    dispatcher: Arc<Dispatcher>,
    logs: Arc<LogStore>,
    ledger: Arc<ExecutionLedger>,
    connection: Arc<ConnectionManager>,
    events: EventBus,
}

impl Inspector {
    pub fn new(ctx: &BridgeContext) -> Self {
        Self {
            dispatcher: Arc::clone(&ctx.dispatcher),
            logs: Arc::clone(&ctx.logs),
            ledger: Arc::clone(&ctx.ledger),
            connection: Arc::clone(&ctx.connection),
            events: ctx.events.clone(),
        }
    }

    /// 订阅 new_log / logs_cleared / websocket_status 事件
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub async fn handle(&self, request: InspectionRequest) -> Value {
        match request {
            InspectionRequest::GetWebsocketStatus => to_json(&self.connection.status()),
            InspectionRequest::ForceWebsocketReconnect => {
                self.connection.force_reconnect();
                json!({ "success": true })
            }
            InspectionRequest::GetLogs => json!({ "logs": self.logs.get_all() }),
            InspectionRequest::ClearLogs => {
                self.logs.clear();
                json!({ "success": true })
            }
            InspectionRequest::RunTool { payload } => to_json(
                &self
                    .dispatcher
                    .run_tool(&payload.tool_name, payload.parameters)
                    .await,
            ),
            InspectionRequest::GetTools => {
                let registry = self.dispatcher.registry();
                json!({
                    "total": registry.len(),
                    "available": registry.tool_names(),
                    "detailed": registry.tool_descriptions(),
                    "command_schema": command_schema(),
                })
            }
            InspectionRequest::ToolStatus(request) => match self.ledger.query(&request) {
                Ok(reply) => to_json(&reply),
                Err(e) => json!({ "error": e.to_string(), "result": "Tool status request failed" }),
            },
            InspectionRequest::RunTrackedTool { payload } => {
                match self.dispatcher.run_tracked(payload).await {
                    Ok(execution) => json!({
                        "result": "Tool execution completed",
                        "execution": to_json(&execution),
                    }),
                    Err(e) => json!({
                        "error": e.to_string(),
                        "result": "Invalid tool execution request",
                    }),
                }
            }
        }
    }

    /// 解码一行 JSON 请求并回复；无法解码时回复 `{ error }`
    pub async fn handle_raw(&self, raw: &str) -> Value {
        match serde_json::from_str::<InspectionRequest>(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => json!({ "error": format!("Invalid inspection request: {}", e) }),
        }
    }
}

fn to_json(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}
