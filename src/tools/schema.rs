//! 命令帧 JSON Schema 生成（schemars），随 get_tools 一起交给控制端

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 入站命令帧格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(rename_all = "camelCase")]
struct CommandFormat {
    /// 调用方分配的关联 ID，原样回传
    pub command_id: String,
    /// 工具名，如 ping、echo 或已注册的插件工具
    pub tool_name: String,
    /// 工具参数，依工具不同而不同
    pub parameters: Option<HashMap<String, serde_json::Value>>,
}

/// 返回命令帧的 JSON Schema
pub fn command_schema() -> serde_json::Value {
    serde_json::to_value(schema_for!(CommandFormat)).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_uses_wire_names() {
        let schema = command_schema();
        let props = &schema["properties"];
        assert!(props.get("commandId").is_some());
        assert!(props.get("toolName").is_some());
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "toolName"));
        assert!(!required.iter().any(|v| v == "parameters"));
    }
}
