pub mod companion;
pub mod dispatcher;
pub mod echo;
pub mod plugin;
pub mod registry;
pub mod schema;

pub use companion::register_companion_tools;
pub use dispatcher::{Dispatcher, ToolExecutionRequest, ToolExecutionResponse, ToolOutcome};
pub use echo::{EchoTool, PingTool};
pub use plugin::PluginTool;
pub use registry::{Tool, ToolRegistry};
pub use schema::command_schema;

use std::sync::Arc;

use crate::companion::CompanionClient;
use crate::config::ToolsSection;

/// 启动时构建注册表：内置工具、伴侣工具与配置中的插件工具
pub fn build_registry(cfg: &ToolsSection, companion: Arc<CompanionClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(PingTool);
    registry.register(EchoTool);
    register_companion_tools(&mut registry, companion);
    for entry in &cfg.plugins {
        tracing::info!(tool = %entry.name, program = %entry.program, "registering plugin tool");
        registry.register(PluginTool::new(entry));
    }
    registry
}
