//! Accessly - 浏览器桥接：让桌面伴侣进程通过持久 WebSocket 驱动浏览器侧的自动化工具
//!
//! 模块划分：
//! - **channel**: 命令通道（协议、退避、套接字抽象、连接管理器）
//! - **companion**: 伴侣进程 HTTP 便捷客户端（次要通道）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、桥接上下文、优雅关闭
//! - **inspection**: 检视端控制面
//! - **observability**: tracing、日志环形缓冲、执行台账、事件
//! - **tools**: 工具注册表、分发器、内置与插件工具

pub mod channel;
pub mod companion;
pub mod config;
pub mod core;
pub mod inspection;
pub mod observability;
pub mod tools;

pub use crate::core::{BridgeContext, BridgeError};
