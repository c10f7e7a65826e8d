//! 桌面伴侣进程的 HTTP 便捷客户端（次要通道）
//!
//! 对固定本地端点发 GET / POST，单次请求有超时（默认 5s），超时映射为 "Request timeout"。
//! 除 make_request 外，所有方法都把失败折叠进返回值，不向调用方抛错。

use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::CompanionSection;
use crate::core::BridgeError;
use crate::tools::{ToolExecutionRequest, ToolExecutionResponse};

const USER_AGENT: &str = "Accessly-Chrome-Extension";

/// 伴侣进程的统一响应格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompanionResponse {
    fn failure(error: BridgeError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// 运行时修改连接参数，None 表示保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
}

/// 当前连接参数；可在运行时整体替换
#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Endpoint {
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// 以 Arc 共享给伴侣工具，连接参数由内部锁保护
pub struct CompanionClient {
    client: Client,
    endpoint: RwLock<Endpoint>,
}

impl CompanionClient {
    pub fn new(cfg: &CompanionSection) -> Result<Self, BridgeError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            endpoint: RwLock::new(Endpoint {
                host: cfg.host.clone(),
                port: cfg.port,
                timeout: cfg.timeout(),
            }),
        })
    }

    pub fn base_url(&self) -> String {
        self.endpoint().base_url()
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 伴侣进程是否在线（GET /health）
    pub async fn is_connected(&self) -> bool {
        match self.make_request("/health", Method::GET, None).await {
            Ok(response) => response.success,
            Err(e) => {
                tracing::debug!("Companion app not connected: {}", e);
                false
            }
        }
    }

    /// POST /message，附带毫秒时间戳
    pub async fn send_message(&self, message_type: &str, data: Option<Value>) -> CompanionResponse {
        let message = json!({
            "type": message_type,
            "data": data,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });
        self.make_request("/message", Method::POST, Some(&message))
            .await
            .unwrap_or_else(CompanionResponse::failure)
    }

    pub async fn get_data(&self, endpoint: &str) -> CompanionResponse {
        self.make_request(endpoint, Method::GET, None)
            .await
            .unwrap_or_else(CompanionResponse::failure)
    }

    pub async fn post_data(&self, endpoint: &str, data: &Value) -> CompanionResponse {
        self.make_request(endpoint, Method::POST, Some(data))
            .await
            .unwrap_or_else(CompanionResponse::failure)
    }

    /// 经伴侣进程执行工具（POST /extension/run-tool），取 data.execution 作为结果
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: Option<Value>,
        execution_id: Option<String>,
    ) -> ToolExecutionResponse {
        let request = ToolExecutionRequest {
            tool_name: Some(tool_name.to_string()),
            parameters: Some(parameters.unwrap_or_else(|| json!({}))),
            execution_id: execution_id.clone(),
        };
        let failed = |error: String| ToolExecutionResponse {
            success: false,
            execution_id: execution_id
                .clone()
                .unwrap_or_else(|| format!("exec_{}", chrono::Utc::now().timestamp_millis())),
            tool_name: tool_name.to_string(),
            result: None,
            error: Some(error),
            timestamp: chrono::Utc::now().timestamp_millis(),
            duration: None,
        };

        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => return failed(e.to_string()),
        };
        match self.make_request("/extension/run-tool", Method::POST, Some(&body)).await {
            Ok(response) => {
                let execution = response
                    .data
                    .as_ref()
                    .and_then(|data| data.get("execution"))
                    .cloned();
                match execution.filter(|_| response.success) {
                    Some(execution) => serde_json::from_value(execution)
                        .unwrap_or_else(|e| failed(format!("Invalid execution payload: {}", e))),
                    None => failed(
                        response
                            .error
                            .unwrap_or_else(|| "Tool execution failed".to_string()),
                    ),
                }
            }
            Err(e) => failed(e.to_string()),
        }
    }

    /// GET /extension/tools；失败返回 None
    pub async fn get_available_tools(&self) -> Option<Value> {
        match self.make_request("/extension/tools", Method::GET, None).await {
            Ok(response) if response.success => response.data,
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to get available tools: {}", e);
                None
            }
        }
    }

    pub async fn click_at(&self, x: i64, y: i64) -> ToolExecutionResponse {
        self.execute_tool("clickAt", Some(json!({ "x": x, "y": y })), None)
            .await
    }

    pub async fn scroll_page(&self, direction: &str, speed: &str) -> ToolExecutionResponse {
        self.execute_tool(
            "scrollPage",
            Some(json!({ "direction": direction, "speed": speed })),
            None,
        )
        .await
    }

    pub async fn navigate_to_url(&self, url: &str) -> ToolExecutionResponse {
        self.execute_tool("goTo", Some(json!({ "url": url })), None).await
    }

    pub async fn wait_for_element(&self, selector: &str, timeout_ms: u64) -> ToolExecutionResponse {
        self.execute_tool(
            "waitForSelector",
            Some(json!({ "selector": selector, "timeout": timeout_ms })),
            None,
        )
        .await
    }

    pub fn update_config(&self, update: CompanionUpdate) {
        let mut endpoint = self.endpoint.write().unwrap_or_else(|e| e.into_inner());
        if let Some(host) = update.host {
            endpoint.host = host;
        }
        if let Some(port) = update.port {
            endpoint.port = port;
        }
        if let Some(timeout_ms) = update.timeout_ms {
            endpoint.timeout = Duration::from_millis(timeout_ms);
        }
    }

    /// 发请求并解析 CompanionResponse；超时、非 2xx、连接失败均为 Err
    pub async fn make_request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<CompanionResponse, BridgeError> {
        let target = self.endpoint();
        let url = format!("{}{}", target.base_url(), endpoint);
        let mut request = self.client.request(method, url).timeout(target.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        Ok(response.json::<CompanionResponse>().await?)
    }
}
