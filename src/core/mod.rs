//! 核心层：错误类型、桥接上下文、优雅关闭

pub mod context;
pub mod error;
pub mod shutdown;

pub use context::BridgeContext;
pub use error::BridgeError;
pub use shutdown::{ShutdownManager, ShutdownReason};
