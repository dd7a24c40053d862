//! 任务（Job）模型与磁盘布局
//!
//! 一个 Job 目录的结构：
//!
//! ```text
//! <jobs_root>/<job_id>/
//!   meta.json           # 任务描述符，plan 之后不可变
//!   .chunks_ready       # 所有 chunk 输入完整落盘后才写入的就绪标记
//!   chunks/
//!     0001/
//!       input.tsv       # 该 chunk 的记录切片
//!       output.tsv      # 逐条追加的结果，每条记录后强制刷盘
//!       progress.json   # 临时进度快照（仅用于展示）
//!       run.log         # worker 的 stdout/stderr
//!       .done           # 输出完整刷盘后才写入的完成标记
//!     0002/ ...
//!   final_result.tsv    # 合并产物，合并成功前不存在
//! ```
//!
//! chunk 目录按 1 起始的零填充序号命名，连续无空洞。
//! 所有续跑/完成判定只依据持久化标记（`.done`、输出文件内容），
//! 永远不依据 progress.json。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 任务描述符（meta.json）
///
/// 由 Chunk Planner 在切分时创建，此后不可变；
/// 编排器和合并器只读取，不修改。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobMeta {
    pub job_id: String,
    pub created_at: String,
    pub input_file: String,
    pub prompt_file: String,
    pub total_records: usize,
    pub chunk_size: usize,
    pub chunk_count: usize,
}

impl JobMeta {
    /// 各 chunk 的记录数（均衡切分：任意两个 chunk 的大小相差不超过 1）
    pub fn chunk_sizes(&self) -> Vec<usize> {
        balanced_sizes(self.total_records, self.chunk_count)
    }

    /// 从 meta.json 加载
    pub fn load(layout: &JobLayout) -> AppResult<Self> {
        let path = layout.meta_path();
        if !path.exists() {
            return Err(crate::error::JobError::NotFound {
                job_id: layout.job_id().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let meta = serde_json::from_str(&content)?;
        Ok(meta)
    }

    /// 写入 meta.json（临时文件 + rename，避免半写状态）
    pub fn save(&self, layout: &JobLayout) -> AppResult<()> {
        let path = layout.meta_path();
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, content)
            .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        Ok(())
    }
}

/// 将 n 条记录均衡分配到 count 个 chunk
///
/// 前 `n % count` 个 chunk 各多分 1 条，其余各 `n / count` 条。
pub fn balanced_sizes(n: usize, count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let base = n / count;
    let rem = n % count;
    (0..count)
        .map(|i| if i < rem { base + 1 } else { base })
        .collect()
}

/// chunk 的执行状态（从持久化标记推导，从不单独存储）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// 尚未产生任何输出
    Pending,
    /// 有输出文件但缺少 .done 标记（中断后的残留，可续跑）
    Processing,
    /// .done 标记存在，永远不再重跑
    Done,
}

/// 任务目录布局：所有路径的唯一出处
#[derive(Clone, Debug)]
pub struct JobLayout {
    job_dir: PathBuf,
    job_id: String,
}

impl JobLayout {
    pub fn new(jobs_root: impl AsRef<Path>, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self {
            job_dir: jobs_root.as_ref().join(&job_id),
            job_id,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn meta_path(&self) -> PathBuf {
        self.job_dir.join("meta.json")
    }

    /// chunk 数据就绪标记：所有 chunk 输入完整落盘后才写入
    pub fn ready_marker(&self) -> PathBuf {
        self.job_dir.join(".chunks_ready")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.job_dir.join("chunks")
    }

    /// chunk 目录名：1 起始、4 位零填充
    pub fn chunk_name(seq: usize) -> String {
        format!("{:04}", seq)
    }

    pub fn chunk_dir(&self, seq: usize) -> PathBuf {
        self.chunks_dir().join(Self::chunk_name(seq))
    }

    pub fn chunk_input(&self, seq: usize) -> PathBuf {
        self.chunk_dir(seq).join("input.tsv")
    }

    pub fn chunk_output(&self, seq: usize) -> PathBuf {
        self.chunk_dir(seq).join("output.tsv")
    }

    pub fn chunk_progress(&self, seq: usize) -> PathBuf {
        self.chunk_dir(seq).join("progress.json")
    }

    pub fn chunk_log(&self, seq: usize) -> PathBuf {
        self.chunk_dir(seq).join("run.log")
    }

    /// chunk 完成标记：输出文件刷盘并关闭之后才写入，是唯一的提交点
    pub fn chunk_done_marker(&self, seq: usize) -> PathBuf {
        self.chunk_dir(seq).join(".done")
    }

    pub fn final_result(&self) -> PathBuf {
        self.job_dir.join("final_result.tsv")
    }

    /// 推导 chunk 状态（只看持久化标记）
    pub fn chunk_state(&self, seq: usize) -> ChunkState {
        if self.chunk_done_marker(seq).exists() {
            ChunkState::Done
        } else if self.chunk_output(seq).exists() {
            ChunkState::Processing
        } else {
            ChunkState::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_sizes_within_one_unit() {
        for (n, count) in [(250usize, 3usize), (100, 7), (5, 5), (1, 1), (10, 3)] {
            let sizes = balanced_sizes(n, count);
            assert_eq!(sizes.len(), count);
            assert_eq!(sizes.iter().sum::<usize>(), n);
            let max = sizes.iter().max().unwrap();
            let min = sizes.iter().min().unwrap();
            assert!(max - min <= 1, "n={} count={} sizes={:?}", n, count, sizes);
        }
    }

    #[test]
    fn test_balanced_sizes_250_by_3() {
        assert_eq!(balanced_sizes(250, 3), vec![84, 83, 83]);
    }

    #[test]
    fn test_chunk_name_zero_padded() {
        assert_eq!(JobLayout::chunk_name(1), "0001");
        assert_eq!(JobLayout::chunk_name(42), "0042");
        assert_eq!(JobLayout::chunk_name(10000), "10000");
    }

    #[test]
    fn test_chunk_state_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let layout = JobLayout::new(dir.path(), "job-x");
        std::fs::create_dir_all(layout.chunk_dir(1)).unwrap();

        assert_eq!(layout.chunk_state(1), ChunkState::Pending);

        std::fs::write(layout.chunk_output(1), "header\n").unwrap();
        assert_eq!(layout.chunk_state(1), ChunkState::Processing);

        std::fs::write(layout.chunk_done_marker(1), "").unwrap();
        assert_eq!(layout.chunk_state(1), ChunkState::Done);
    }
}
