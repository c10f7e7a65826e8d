//! 外部插件工具：由配置 [[tools.plugins]] 注册，运行「程序 + 参数模板」承载页面自动化等动作
//!
//! 参数模板中 {{key}} 从命令参数中取 key；执行时无 shell，直接 exec program + substituted args。
//! stdout 能解析为 JSON 则作为结构化结果，否则按字符串返回；非零退出码视为错误。

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::PluginEntry;
use crate::tools::Tool;

/// 从配置项构建的插件工具
pub struct PluginTool {
    name: String,
    description: String,
    program: String,
    args_template: Vec<String>,
    timeout_secs: u64,
}

impl PluginTool {
    pub fn new(entry: &PluginEntry) -> Self {
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            program: entry.program.clone(),
            args_template: entry.args.clone(),
            timeout_secs: entry.timeout_secs,
        }
    }

    /// 替换模板中的 {{key}}；缺失的 key 原样保留
    fn substitute(&self, params: &Value) -> Vec<String> {
        let empty = serde_json::Map::new();
        let obj = params.as_object().unwrap_or(&empty);
        self.args_template
            .iter()
            .map(|tpl| {
                let mut s = tpl.clone();
                for (k, v) in obj {
                    let placeholder = format!("{{{{{}}}}}", k);
                    let val: String = match v {
                        Value::String(x) => x.clone(),
                        _ => v.to_string(),
                    };
                    s = s.replace(&placeholder, &val);
                }
                s
            })
            .collect()
    }
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let args_vec = self.substitute(&params);
        tracing::info!(tool = %self.name, program = %self.program, "plugin tool invoke");
        let child = Command::new(&self.program)
            .args(&args_vec)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("plugin spawn failed: {}", e))?;
        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("plugin timeout after {}s", self.timeout_secs))?
            .map_err(|e| format!("plugin wait failed: {}", e))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(format!(
                "exit {:?}: stderr {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        let stdout = stdout.trim();
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
    }
}
