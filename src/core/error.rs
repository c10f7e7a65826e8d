//! 桥接错误类型
//!
//! 传输类错误由 ConnectionManager 就地恢复（重连 + 退避），分发类错误统一转成 `success:false` 回包，
//! 不会越过 Dispatcher 边界；只有配置错误会让进程在启动时退出。

use thiserror::Error;

/// 桥接运行过程中可能出现的错误（连接、协议、工具、HTTP、配置）
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// 入站帧无法解析，或缺少必需字段
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Tool '{0}' not found.")]
    ToolNotFound(String),

    /// 追踪通道只接受已注册的工具
    #[error("Tool '{name}' is not available. Available tools: {available}")]
    ToolNotAvailable { name: String, available: String },

    #[error("Tool '{0}' panicked")]
    ToolPanicked(String),

    #[error("Tool '{0}' was aborted")]
    ToolAborted(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unknown action: {0}. Available actions: history, stats, get, clear, health")]
    UnknownAction(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BridgeError::RequestTimeout
        } else if let Some(status) = e.status() {
            BridgeError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            }
        } else {
            BridgeError::Request(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Transport(e.to_string())
    }
}
