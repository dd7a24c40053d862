//! 离线 Mock 估算器
//!
//! 不联网、瞬时返回、对同一 order_id 永远给出相同结果。
//! 用于集成测试和流程演练（dry-run 验证切分/续跑/合并逻辑
//! 时不需要真实 API 额度）。

use async_trait::async_trait;

use crate::error::CallError;
use crate::estimator::Estimator;
use crate::models::{Estimate, InputRecord};

/// 确定性的离线估算器
pub struct MockEstimator;

impl MockEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a：足够稳定的非加密哈希，保证跨进程结果一致
fn fnv1a(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl Estimator for MockEstimator {
    async fn estimate(&self, record: &InputRecord) -> Result<Estimate, CallError> {
        let h = fnv1a(&record.order_id);
        let width = 10 + (h % 40);
        let depth = 8 + ((h >> 8) % 30);
        let height = 5 + ((h >> 16) % 20);
        let weight_kg = ((h >> 24) % 5000) as f64 / 1000.0 + 0.1;

        Ok(Estimate {
            volume: format!("{}x{}x{}", width, depth, height),
            packed_volume: format!("{}x{}x{}", width + 2, depth + 2, height + 2),
            weight_kg,
            reason: "离线估算".to_string(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
