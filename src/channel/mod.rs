//! 命令通道：协议、退避、套接字抽象与连接管理器
//!
//! 入站命令 → ConnectionManager 解码 → Dispatcher 执行 → 结果带原 commandId 回发到同一连接。

pub mod backoff;
pub mod manager;
pub mod protocol;
pub mod socket;

pub use backoff::Backoff;
pub use manager::{ConnectionManager, ConnectionStatus, ConnectionStatusReport};
pub use protocol::{CommandEnvelope, ResultEnvelope};
pub use socket::{Connector, Socket, SocketEvent, WsConnector};
