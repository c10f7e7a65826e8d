//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ACCESSLY__*` 覆盖（双下划线表示嵌套，如 `ACCESSLY__BRIDGE__URL=ws://127.0.0.1:9000`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeSection,
    pub logs: LogsSection,
    pub ledger: LedgerSection,
    pub companion: CompanionSection,
    pub tools: ToolsSection,
}

/// [bridge] 段：控制端 WebSocket 地址、保活周期、重连退避
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSection {
    #[serde(default = "default_bridge_url")]
    pub url: String,
    /// 保活定时器周期（秒）
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default)]
    pub backoff: BackoffSection,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            keepalive_secs: default_keepalive_secs(),
            backoff: BackoffSection::default(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_keepalive_secs() -> u64 {
    15
}

/// [bridge.backoff] 段：初始间隔、上限（毫秒）与增长倍数
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            max_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_backoff_base_ms() -> u64 {
    5000
}

fn default_backoff_max_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

/// [logs] 段：日志环形缓冲容量
#[derive(Debug, Clone, Deserialize)]
pub struct LogsSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for LogsSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    1000
}

/// [ledger] 段：执行台账容量、默认历史条数、健康检查窗口与告警阈值
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_health_window_secs")]
    pub health_window_secs: u64,
    /// 窗口内失败率低于该值为 warning，否则为 error
    #[serde(default = "default_warning_failure_ratio")]
    pub warning_failure_ratio: f64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            history_limit: default_history_limit(),
            health_window_secs: default_health_window_secs(),
            warning_failure_ratio: default_warning_failure_ratio(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}

fn default_health_window_secs() -> u64 {
    300
}

fn default_warning_failure_ratio() -> f64 {
    0.2
}

/// [companion] 段：桌面伴侣进程的 HTTP 端点与请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct CompanionSection {
    #[serde(default = "default_companion_host")]
    pub host: String,
    #[serde(default = "default_companion_port")]
    pub port: u16,
    #[serde(default = "default_companion_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CompanionSection {
    fn default() -> Self {
        Self {
            host: default_companion_host(),
            port: default_companion_port(),
            timeout_ms: default_companion_timeout_ms(),
        }
    }
}

impl CompanionSection {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_companion_host() -> String {
    "localhost".to_string()
}

fn default_companion_port() -> u16 {
    3001
}

fn default_companion_timeout_ms() -> u64 {
    5000
}

/// [tools] 段：分发超时与外部插件工具
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），0 表示不设超时
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

impl ToolsSection {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// [[tools.plugins]] 条目：以外部程序承载的工具（页面自动化等动作由外部实现）
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub program: String,
    /// 参数模板，`{{key}}` 从命令参数中取值
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_plugin_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_plugin_timeout_secs() -> u64 {
    30
}

/// 从 config 目录加载配置，环境变量 ACCESSLY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ACCESSLY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ACCESSLY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
