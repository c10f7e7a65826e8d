//! Accessly Bridge
//!
//! 入口：初始化日志、加载配置、构建桥接上下文，连接控制端并在 stdin / stdout 上提供检视端（每行一个 JSON）。
//!
//! 运行方式：
//! ```bash
//! ACCESSLY__BRIDGE__URL=ws://localhost:8080 cargo run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use accessly::config::load_config;
use accessly::inspection::Inspector;
use accessly::{observability, BridgeContext};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var_os("ACCESSLY_CONFIG").map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let ctx = BridgeContext::new(cfg).context("Failed to build bridge context")?;

    ctx.shutdown.install_signal_handlers();
    tracing::info!(
        url = %ctx.config.bridge.url,
        tools = ?ctx.dispatcher.registry().tool_names(),
        "Starting Accessly bridge"
    );

    let inspector = Arc::new(Inspector::new(&ctx));

    // 事件流：每个事件一行 JSON
    let mut events = inspector.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Failed to encode event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Inspection stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 检视端请求：每行一个 JSON，并发处理
    let stdin_inspector = Arc::clone(&inspector);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let inspector = Arc::clone(&stdin_inspector);
            tokio::spawn(async move {
                let reply = inspector.handle_raw(&line).await;
                println!("{}", reply);
            });
        }
        tracing::debug!("Inspection input closed");
    });

    ctx.logs.log("🚀 Accessly bridge loaded.");
    ctx.connection.start();

    ctx.shutdown.wait_for_shutdown().await;
    tracing::info!("Accessly bridge stopped");
    Ok(())
}
