//! 可观测性：tracing 初始化、日志环形缓冲、执行台账、检视端事件

pub mod events;
pub mod ledger;
pub mod log_store;

pub use events::{BridgeEvent, EventBus};
pub use ledger::{ExecutionLedger, ExecutionRecord, HealthStatus};
pub use log_store::LogStore;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 日志：默认 accessly=info，可通过 RUST_LOG 覆盖；写 stderr，stdout 留给检视端
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("accessly=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
