//! 有界重试策略
//!
//! 只对瞬时失败生效：每条记录最多尝试 `max_attempts` 次，
//! 重试间隔按指数退避（base, 2*base, 4*base, ...）。
//! 重试耗尽后降级为记录级失败，绝不无限重试。

use std::time::Duration;

use crate::config::Config;

/// 重试策略
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次调用）
    pub max_attempts: u32,
    /// 首次重试前的等待时长
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1) as u32,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// 第 `attempt` 次尝试失败后的等待时长（attempt 从 1 起始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
