//! 桥接上下文：进程启动时构建一次，持有所有共享组件的句柄
//!
//! 日志缓冲、执行台账、分发器和连接管理器都从这里拿，不用全局单例；测试每次新建一个。

use std::sync::Arc;

use crate::channel::{ConnectionManager, Connector, WsConnector};
use crate::companion::CompanionClient;
use crate::config::AppConfig;
use crate::observability::{EventBus, ExecutionLedger, LogStore};
use crate::tools::{build_registry, Dispatcher, ToolRegistry};

use super::error::BridgeError;
use super::shutdown::ShutdownManager;

pub struct BridgeContext {
    pub config: AppConfig,
    pub events: EventBus,
    pub logs: Arc<LogStore>,
    pub ledger: Arc<ExecutionLedger>,
    pub dispatcher: Arc<Dispatcher>,
    pub connection: Arc<ConnectionManager>,
    pub companion: Arc<CompanionClient>,
    pub shutdown: Arc<ShutdownManager>,
}

impl BridgeContext {
    /// 使用真实 WebSocket 连接器与配置中的工具（含伴侣工具）
    pub fn new(config: AppConfig) -> Result<Self, BridgeError> {
        let companion = Arc::new(CompanionClient::new(&config.companion)?);
        let registry = build_registry(&config.tools, Arc::clone(&companion));
        Ok(Self::assemble(config, registry, Arc::new(WsConnector), companion))
    }

    /// 指定注册表与连接器（测试或嵌入时使用）
    pub fn with_parts(
        config: AppConfig,
        registry: ToolRegistry,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, BridgeError> {
        let companion = Arc::new(CompanionClient::new(&config.companion)?);
        Ok(Self::assemble(config, registry, connector, companion))
    }

    fn assemble(
        config: AppConfig,
        registry: ToolRegistry,
        connector: Arc<dyn Connector>,
        companion: Arc<CompanionClient>,
    ) -> Self {
        let events = EventBus::default();
        let logs = Arc::new(LogStore::new(config.logs.capacity, events.clone()));
        let ledger = Arc::new(ExecutionLedger::from_config(&config.ledger));
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::new(registry), Arc::clone(&logs), Arc::clone(&ledger))
                .with_timeout(config.tools.timeout()),
        );
        let shutdown = Arc::new(ShutdownManager::new());
        let connection = ConnectionManager::new(
            &config.bridge,
            connector,
            Arc::clone(&dispatcher),
            Arc::clone(&logs),
            events.clone(),
            shutdown.token(),
        );

        Self {
            config,
            events,
            logs,
            ledger,
            dispatcher,
            connection,
            companion,
            shutdown,
        }
    }
}
