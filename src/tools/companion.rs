//! 伴侣进程工具：经 HTTP 通道查询 / 推送数据
//!
//! electronConnect / electronGet / electronPost / electronSend 共享同一个 CompanionClient。
//! 伴侣进程返回 `success:false` 时工具以错误完成，错误文本优先取伴侣进程给出的 error。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::companion::{CompanionClient, CompanionResponse};
use crate::tools::{Tool, ToolRegistry};

/// 注册全部伴侣工具
pub fn register_companion_tools(registry: &mut ToolRegistry, client: Arc<CompanionClient>) {
    registry.register(CompanionConnectTool {
        client: Arc::clone(&client),
    });
    registry.register(CompanionGetTool {
        client: Arc::clone(&client),
    });
    registry.register(CompanionPostTool {
        client: Arc::clone(&client),
    });
    registry.register(CompanionSendTool { client });
}

fn required_str<'a>(params: &'a Value, key: &str, message: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| message.to_string())
}

/// 成功时把伴侣进程的 data 放在 `field` 下
fn into_result(
    response: CompanionResponse,
    summary: &str,
    field: &str,
    fallback: &str,
) -> Result<Value, String> {
    if response.success {
        let mut body = json!({ "result": summary });
        body[field] = response.data.unwrap_or(Value::Null);
        Ok(body)
    } else {
        Err(response.error.unwrap_or_else(|| fallback.to_string()))
    }
}

/// 伴侣进程在线检查
pub struct CompanionConnectTool {
    client: Arc<CompanionClient>,
}

#[async_trait]
impl Tool for CompanionConnectTool {
    fn name(&self) -> &str {
        "electronConnect"
    }

    fn description(&self) -> &str {
        "Check whether the desktop companion app is reachable over HTTP."
    }

    async fn execute(&self, _params: Value) -> Result<Value, String> {
        let connected = self.client.is_connected().await;
        let result = if connected {
            "Connected to Electron app"
        } else {
            "Electron app not responding"
        };
        Ok(json!({ "result": result, "connected": connected }))
    }
}

/// GET 伴侣进程的任意端点
pub struct CompanionGetTool {
    client: Arc<CompanionClient>,
}

#[async_trait]
impl Tool for CompanionGetTool {
    fn name(&self) -> &str {
        "electronGet"
    }

    fn description(&self) -> &str {
        "GET an endpoint of the companion app. Args: {\"endpoint\": \"/path\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "endpoint": { "type": "string" } },
            "required": ["endpoint"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let endpoint = required_str(&params, "endpoint", "Endpoint is required")?;
        let response = self.client.get_data(endpoint).await;
        into_result(response, "Data retrieved successfully", "data", "Failed to get data")
    }
}

/// POST JSON 到伴侣进程的任意端点
pub struct CompanionPostTool {
    client: Arc<CompanionClient>,
}

#[async_trait]
impl Tool for CompanionPostTool {
    fn name(&self) -> &str {
        "electronPost"
    }

    fn description(&self) -> &str {
        "POST data to an endpoint of the companion app. Args: {\"endpoint\": \"/path\", \"data\": {...}}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "endpoint": { "type": "string" },
                "data": {}
            },
            "required": ["endpoint"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let endpoint = required_str(&params, "endpoint", "Endpoint is required")?;
        let data = params.get("data").cloned().unwrap_or(Value::Null);
        let response = self.client.post_data(endpoint, &data).await;
        into_result(response, "Data posted successfully", "response", "Failed to post data")
    }
}

/// 向伴侣进程发送带类型的消息（POST /message）
pub struct CompanionSendTool {
    client: Arc<CompanionClient>,
}

#[async_trait]
impl Tool for CompanionSendTool {
    fn name(&self) -> &str {
        "electronSend"
    }

    fn description(&self) -> &str {
        "Send a typed message to the companion app. Args: {\"type\": \"...\", \"data\": {...}}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": { "type": "string" },
                "data": {}
            },
            "required": ["type"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let message_type = required_str(&params, "type", "Message type is required")?;
        let response = self
            .client
            .send_message(message_type, params.get("data").cloned())
            .await;
        into_result(response, "Message sent successfully", "response", "Failed to send message")
    }
}
