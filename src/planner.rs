//! Chunk Planner - 切分层
//!
//! ## 职责
//!
//! 一次性把输入数据集切分为均衡的 chunk 并落盘：
//!
//! 1. **校验输入**：空数据集、缺列直接报错，不落任何文件
//! 2. **均衡切分**：任意两个 chunk 的记录数相差不超过 1
//! 3. **原子落盘**：每个 chunk 的 input.tsv 先写临时文件再 rename
//! 4. **就绪标记**：所有 chunk 完整写入后才写 .chunks_ready，
//!    该标记是 "chunk 数据完整、可以调度" 的唯一依据
//!
//! 切分是纯一次性操作，没有并发；Job 描述符在这里创建后不可变。

use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult, InputError};
use crate::models::job::{balanced_sizes, JobLayout, JobMeta};
use crate::models::record::InputColumns;
use crate::store::tsv;

/// 切分请求
#[derive(Clone, Debug)]
pub struct PlanRequest {
    /// 输入 TSV 文件
    pub input: PathBuf,
    /// 提示词模板文件名（记录进 meta，由 worker 使用）
    pub prompt_file: String,
    /// 目标 chunk 大小（与 chunk_count 二选一；均未指定时用配置默认值）
    pub chunk_size: Option<usize>,
    /// 目标 chunk 数量
    pub chunk_count: Option<usize>,
    /// 实验名前缀（可选），如 baseline
    pub name: Option<String>,
}

/// 切分输入数据集并创建任务
///
/// # 返回
/// 返回新任务的描述符；任何校验失败都发生在落盘之前
pub fn plan(config: &Config, request: &PlanRequest) -> AppResult<JobMeta> {
    // ========== 校验阶段（不落盘） ==========
    let input_path = &request.input;
    if !input_path.exists() {
        return Err(InputError::NotFound {
            path: input_path.display().to_string(),
        }
        .into());
    }

    let (header, rows) = tsv::read_table(input_path)?;
    if rows.is_empty() {
        return Err(InputError::EmptyDataset {
            path: input_path.display().to_string(),
        }
        .into());
    }
    // 必需列校验（plan 时报错比 worker 跑到一半报错便宜得多）
    InputColumns::resolve(&header, &input_path.display().to_string())?;

    let total_records = rows.len();
    let chunk_count = resolve_chunk_count(config, request, total_records);
    let sizes = balanced_sizes(total_records, chunk_count);

    let job_id = generate_job_id(request, input_path);
    let layout = JobLayout::new(&config.jobs_root, &job_id);

    log_plan_start(&job_id, input_path, total_records, chunk_count);

    // ========== 落盘阶段 ==========
    std::fs::create_dir_all(layout.chunks_dir())
        .map_err(|e| AppError::file_write_failed(layout.chunks_dir().display().to_string(), e))?;

    let mut offset = 0;
    for (idx, &size) in sizes.iter().enumerate() {
        let seq = idx + 1;
        let chunk_dir = layout.chunk_dir(seq);
        std::fs::create_dir_all(&chunk_dir)
            .map_err(|e| AppError::file_write_failed(chunk_dir.display().to_string(), e))?;

        let slice = &rows[offset..offset + size];
        tsv::write_table_atomic(&layout.chunk_input(seq), &header, slice)?;
        offset += size;

        info!("  chunk {}: {} 条记录", JobLayout::chunk_name(seq), size);
    }
    debug_assert_eq!(offset, total_records);

    let meta = JobMeta {
        job_id: job_id.clone(),
        created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        input_file: input_path.display().to_string(),
        prompt_file: request.prompt_file.clone(),
        total_records,
        chunk_size: sizes[0],
        chunk_count,
    };
    meta.save(&layout)?;

    // 就绪标记必须最后写：它存在即意味着所有 chunk 输入完整
    std::fs::write(layout.ready_marker(), "")
        .map_err(|e| AppError::file_write_failed(layout.ready_marker().display().to_string(), e))?;

    log_plan_complete(&meta, &layout);
    Ok(meta)
}

/// 决定 chunk 数量：显式数量 > 显式大小 > 配置默认大小
///
/// 数量始终被限制在 [1, 记录数] 内，保证没有空 chunk。
fn resolve_chunk_count(config: &Config, request: &PlanRequest, total: usize) -> usize {
    let count = match (request.chunk_count, request.chunk_size) {
        (Some(count), _) => count,
        (None, Some(size)) => div_ceil(total, size.max(1)),
        (None, None) => div_ceil(total, config.chunk_size.max(1)),
    };
    count.clamp(1, total)
}

fn div_ceil(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

/// 生成任务 ID：`{前缀}-{时间戳}-{数据集名}`
///
/// 时间戳保证每次调用唯一；前缀默认 `vw`，可用 --name 替换为实验名。
fn generate_job_id(request: &PlanRequest, input_path: &std::path::Path) -> String {
    let prefix = request.name.as_deref().unwrap_or("vw");
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let dataset = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    format!("{}-{}-{}", prefix, timestamp, dataset)
}

// ========== 日志辅助函数 ==========

fn log_plan_start(job_id: &str, input: &std::path::Path, total: usize, chunks: usize) {
    info!("{}", "=".repeat(60));
    info!("📂 切分数据集: {}", input.display());
    info!("🆔 任务: {}", job_id);
    info!("📊 记录总数: {}, chunk 数量: {}", total, chunks);
    info!("{}", "=".repeat(60));
}

fn log_plan_complete(meta: &JobMeta, layout: &JobLayout) {
    info!("{}", "-".repeat(60));
    info!("✅ 任务创建完成: {}", meta.job_id);
    info!("📁 任务目录: {}", layout.job_dir().display());
    info!("💡 下一步: run {} --workers <N>", meta.job_id);
}
