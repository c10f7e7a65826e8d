//! 内置工具：ping / echo（连通性检查与测试用）

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// Ping 工具：总是返回 "pong"
pub struct PingTool;

#[async_trait]
impl Tool for PingTool {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Connectivity check. Returns \"pong\"."
    }

    async fn execute(&self, _params: Value) -> Result<Value, String> {
        Ok(Value::String("pong".to_string()))
    }
}

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text (for testing). Args: {\"text\": \"message\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        params
            .get("text")
            .and_then(|v| v.as_str())
            .map(|text| Value::String(text.to_string()))
            .ok_or_else(|| "text is required".to_string())
    }
}
