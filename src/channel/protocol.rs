//! 命令通道协议：每帧一个完整 JSON 文档
//!
//! 入站 `{ commandId, toolName, parameters? }`，出站 `{ commandId, success, result?, error? }`；
//! commandId 由控制端分配，桥接端只负责原样回传。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::BridgeError;
use crate::tools::ToolOutcome;

/// 入站命令帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    #[serde(default)]
    pub command_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl CommandEnvelope {
    /// 解析一帧；非 JSON 或字段类型不符时返回 Protocol 错误
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(raw).map_err(|e| BridgeError::Protocol(e.to_string()))
    }

    /// 非空的工具名；缺失或为空时该帧应丢弃
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// 出站结果帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub command_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn new(command_id: String, outcome: ToolOutcome) -> Self {
        Self {
            command_id,
            success: outcome.success,
            result: outcome.result,
            error: outcome.error,
        }
    }
}
