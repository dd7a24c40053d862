//! 估算调用边界 - 业务能力层
//!
//! ## 职责
//!
//! 只负责"对单条记录做一次体积/重量估算"这一件事：
//!
//! - 不出现 chunk、Job、文件路径
//! - 不做重试（重试属于 Chunk Runner 的策略）
//! - 失败必须分类为瞬时（可重试）或永久（不可重试）
//!
//! 具体实现：
//! - [`LlmEstimator`]：通过 `async-openai` 调用兼容 OpenAI API 的服务
//! - [`MockEstimator`]：离线确定性估算，用于测试与演练

pub mod llm;
pub mod mock;

use async_trait::async_trait;

pub use llm::LlmEstimator;
pub use mock::MockEstimator;

use crate::config::Config;
use crate::error::{AppResult, CallError, ConfigError};
use crate::models::{Estimate, InputRecord};

/// 估算能力的统一接口
///
/// 实现方保证：返回的错误已按瞬时/永久分类，调用方只根据
/// [`CallError::is_transient`] 决定是否重试。
#[async_trait]
pub trait Estimator: Send + Sync {
    /// 对单条记录做一次估算调用
    async fn estimate(&self, record: &InputRecord) -> Result<Estimate, CallError>;

    /// 实现名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置构建估算器
///
/// # 参数
/// - `prompt_file`: 提示词模板文件名（相对于配置的 prompt_dir）
pub fn build_estimator(config: &Config, prompt_file: &str) -> AppResult<Box<dyn Estimator>> {
    match config.estimator.as_str() {
        "openai" => Ok(Box::new(LlmEstimator::new(config, prompt_file)?)),
        "mock" => Ok(Box::new(MockEstimator::new())),
        other => Err(ConfigError::UnknownEstimator {
            value: other.to_string(),
        }
        .into()),
    }
}
