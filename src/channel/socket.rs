//! 套接字抽象：ConnectionManager 只和 Socket（出站 / 入站文本帧通道 + 关闭令牌）打交道
//!
//! WsConnector 用 tokio-tungstenite 建立真实连接；测试用自己的 Connector 替换。

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::core::BridgeError;

/// 入站事件；接收端返回 None 即连接已关闭
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Message(String),
    Error(String),
}

/// 一条已打开的连接
pub struct Socket {
    /// 待发送的文本帧
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
    /// 取消即关闭连接
    pub close: CancellationToken,
}

/// 连接工厂
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Socket, BridgeError>;
}

/// 基于 tokio-tungstenite 的 WebSocket 连接器
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Socket, BridgeError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<SocketEvent>();
        let close = CancellationToken::new();

        let writer_close = close.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_close.cancelled() => break,
                    msg = out_rx.recv() => match msg {
                        Some(text) => {
                            if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                                tracing::warn!("WebSocket send failed: {}", BridgeError::from(e));
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            let _ = ws_tx.close().await;
        });

        let reader_close = close.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = reader_close.cancelled() => break,
                    msg = ws_rx.next() => msg,
                };
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if in_tx.send(SocketEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // ping / pong 由 tungstenite 处理，二进制帧不属于协议
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = in_tx.send(SocketEvent::Error(BridgeError::from(e).to_string()));
                        break;
                    }
                }
            }
            reader_close.cancel();
        });

        Ok(Socket {
            outbound: out_tx,
            inbound: in_rx,
            close,
        })
    }
}
