//! 进度快照（progress.json）
//!
//! 纯展示用途：监控面板读它渲染进度条，除此之外没有任何
//! 消费方。续跑判定、完成判定、合并判定一律不看它——
//! 它可能过期、缺失、半写，都不影响正确性。
//! 因此写入失败只记 warn，绝不让它中断 chunk 处理。

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// 一个 chunk 的进度快照
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// 已落盘的记录数
    pub processed: usize,
    /// 该 chunk 的记录总数
    pub total: usize,
    /// 当前阶段: running / completed
    pub phase: String,
    /// 正在处理的记录（可选）
    pub current_record_id: Option<String>,
    /// 本次运行已耗时（秒）
    pub elapsed_secs: u64,
}

impl ProgressSnapshot {
    pub fn running(processed: usize, total: usize, current: &str, elapsed_secs: u64) -> Self {
        Self {
            processed,
            total,
            phase: "running".to_string(),
            current_record_id: Some(current.to_string()),
            elapsed_secs,
        }
    }

    pub fn completed(total: usize, elapsed_secs: u64) -> Self {
        Self {
            processed: total,
            total,
            phase: "completed".to_string(),
            current_record_id: None,
            elapsed_secs,
        }
    }
}

/// 写入进度快照（尽力而为）
pub fn write_snapshot(path: &Path, snapshot: &ProgressSnapshot) {
    let content = match serde_json::to_string(snapshot) {
        Ok(c) => c,
        Err(e) => {
            warn!("进度快照序列化失败: {}", e);
            return;
        }
    };
    if let Err(e) = std::fs::write(path, content) {
        warn!("进度快照写入失败 ({}): {}", path.display(), e);
    }
}

/// 读取进度快照；缺失或损坏一律返回 None
pub fn read_snapshot(path: &Path) -> Option<ProgressSnapshot> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
