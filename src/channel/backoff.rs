//! 重连退避状态机：从 base 开始按倍数增长，封顶 max；只有连接成功才复位
//!
//! 纯状态，不碰时钟，调用方拿到间隔后自己去等待。
//! 倍数小于 1 或非有限值按 1 处理，max 至少为 base，保证间隔单调不减且计算不会 panic。

use std::time::Duration;

use crate::config::BackoffSection;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        Self {
            base,
            max: max.max(base),
            multiplier,
            current: base,
        }
    }

    pub fn from_config(cfg: &BackoffSection) -> Self {
        Self::new(
            Duration::from_millis(cfg.base_ms),
            Duration::from_millis(cfg.max_ms),
            cfg.multiplier,
        )
    }

    /// 返回本次应等待的间隔，并把下一次间隔推进一步
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }

    /// 下一次将要使用的间隔（不推进）
    pub fn peek(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffSection::default())
    }
}
