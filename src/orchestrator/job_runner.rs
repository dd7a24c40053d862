//! Worker Orchestrator - 编排层
//!
//! ## 职责
//!
//! 本模块是 `run` 命令的入口，负责一个任务的并行执行与资源管理。
//!
//! ## 核心功能
//!
//! 1. **就绪校验**：缺少 .chunks_ready 标记的任务拒绝执行
//! 2. **状态分类**：按持久化标记把 chunk 分为 Done / 待执行
//! 3. **并发控制**：使用 Semaphore 限制同时运行的 worker 数量
//! 4. **进程隔离**：每个 chunk 一个独立 worker 子进程
//! 5. **故障隔离**：单个 chunk 失败不影响其他 chunk，编排器照常跑完
//! 6. **全局统计**：汇总所有 chunk 的执行结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单条记录的细节，向下委托给 worker 进程
//! - **幂等重入**：已完成的 chunk 永远跳过，编排器可反复重启
//! - **退出码即真相**：全部完成才返回 all_done，供调用方决定退出码

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, JobError};
use crate::models::{ChunkState, JobLayout, JobMeta, RESULT_COLUMNS, STATUS_OK};
use crate::orchestrator::monitor;
use crate::orchestrator::worker::{launch_chunk_worker, WorkerEnv};
use crate::store::tsv;
use crate::utils::logging;

/// 任务编排器
#[derive(Debug)]
pub struct App {
    config: Config,
    layout: JobLayout,
    meta: JobMeta,
}

/// 一次编排运行的汇总
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    pub total_chunks: usize,
    /// 启动时已有 .done 标记的 chunk 数
    pub already_done: usize,
    /// 本次运行完成的 chunk 数
    pub succeeded: usize,
    /// 本次运行失败（保持未完成）的 chunk 数
    pub failed: usize,
}

impl RunSummary {
    /// 所有 chunk 是否都已完成
    pub fn all_done(&self) -> bool {
        self.already_done + self.succeeded == self.total_chunks
    }
}

/// 任务状态汇总（`status` 命令）
#[derive(Clone, Debug)]
pub struct JobStatus {
    pub job_id: String,
    pub total_records: usize,
    pub chunk_count: usize,
    pub done_chunks: usize,
    pub processing_chunks: usize,
    /// 尚未开始的 chunk 名称
    pub pending_chunks: Vec<String>,
    /// 已落盘的成功记录数
    pub ok_records: usize,
    /// 已落盘的失败记录数
    pub failed_records: usize,
    pub merged: bool,
}

impl App {
    /// 加载已有任务
    pub fn load(config: Config, job_id: &str) -> AppResult<Self> {
        let layout = JobLayout::new(&config.jobs_root, job_id);
        let meta = JobMeta::load(&layout)?;
        Ok(Self {
            config,
            layout,
            meta,
        })
    }

    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    pub fn meta(&self) -> &JobMeta {
        &self.meta
    }

    /// 并行执行所有未完成的 chunk
    ///
    /// # 参数
    /// - `workers`: 并发 worker 数（None 时用配置默认值）
    /// - `resume`: 传递给 worker，决定是否保留 chunk 的已有输出
    /// - `dry_run`: 只展示将要执行的 chunk，不启动任何 worker
    pub async fn run(
        &self,
        workers: Option<usize>,
        resume: bool,
        dry_run: bool,
    ) -> AppResult<RunSummary> {
        // 就绪标记是 chunk 数据完整性的唯一依据
        if !self.layout.ready_marker().exists() {
            return Err(JobError::ChunksNotReady {
                job_id: self.meta.job_id.clone(),
            }
            .into());
        }

        let max_workers = workers.unwrap_or(self.config.max_workers).max(1);
        logging::log_startup(&self.meta.job_id, max_workers);

        // 按持久化标记分类：.done 的 chunk 永远不重跑
        let mut pending = Vec::new();
        let mut summary = RunSummary {
            total_chunks: self.meta.chunk_count,
            ..RunSummary::default()
        };
        for seq in 1..=self.meta.chunk_count {
            match self.layout.chunk_state(seq) {
                ChunkState::Done => summary.already_done += 1,
                ChunkState::Processing | ChunkState::Pending => pending.push(seq),
            }
        }

        if pending.is_empty() {
            info!("✅ 所有 {} 个 chunk 都已完成, 无事可做", self.meta.chunk_count);
            return Ok(summary);
        }

        info!(
            "📦 待执行 chunk: {} 个 (已完成 {} 个), 模式: {}",
            pending.len(),
            summary.already_done,
            if resume { "续跑" } else { "重跑" }
        );

        if dry_run {
            for seq in &pending {
                info!("  [dry-run] 将执行 chunk {}", JobLayout::chunk_name(*seq));
            }
            return Ok(summary);
        }

        let env = WorkerEnv::from_config(&self.config)?;
        let monitor_handle = monitor::spawn_monitor(
            self.layout.clone(),
            self.meta.clone(),
            Duration::from_millis(self.config.poll_interval_ms),
        );

        // Semaphore + tokio::spawn：同时最多 max_workers 个子进程
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut handles = Vec::new();
        for seq in pending {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| crate::error::AppError::Other(e.to_string()))?;
            let env = env.clone();
            let layout = self.layout.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                launch_chunk_worker(&env, &layout, seq, resume).await
            });
            handles.push((seq, handle));
        }

        // 所有 worker 都已 spawn, 统一等待收尾
        let (seqs, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = futures::future::join_all(tasks).await;

        for (seq, joined) in seqs.into_iter().zip(results) {
            let chunk_id = JobLayout::chunk_name(seq);
            let clean_exit = match joined {
                Ok(Ok(clean)) => clean,
                Ok(Err(e)) => {
                    error!("❌ chunk {} 的 worker 启动失败: {}", chunk_id, e);
                    false
                }
                Err(e) => {
                    error!("❌ chunk {} 的任务执行失败: {}", chunk_id, e);
                    false
                }
            };

            // 完成判定只看 .done 标记, 不信任退出码
            if self.layout.chunk_state(seq) == ChunkState::Done {
                summary.succeeded += 1;
                if !clean_exit {
                    warn!("⚠️ chunk {} 有 .done 标记但 worker 非零退出", chunk_id);
                }
            } else {
                summary.failed += 1;
                warn!(
                    "⚠️ chunk {} 未完成, 可用 --resume 续跑 (日志: {})",
                    chunk_id,
                    self.layout.chunk_log(seq).display()
                );
            }
        }

        monitor_handle.abort();

        logging::print_final_stats(
            summary.succeeded,
            summary.failed,
            summary.already_done,
            summary.total_chunks,
        );
        Ok(summary)
    }

    /// 只读的状态汇总：扫描持久化的标记与输出文件
    pub fn status(&self) -> AppResult<JobStatus> {
        let mut status = JobStatus {
            job_id: self.meta.job_id.clone(),
            total_records: self.meta.total_records,
            chunk_count: self.meta.chunk_count,
            done_chunks: 0,
            processing_chunks: 0,
            pending_chunks: Vec::new(),
            ok_records: 0,
            failed_records: 0,
            merged: self.layout.final_result().exists(),
        };

        for seq in 1..=self.meta.chunk_count {
            match self.layout.chunk_state(seq) {
                ChunkState::Done => status.done_chunks += 1,
                ChunkState::Processing => status.processing_chunks += 1,
                ChunkState::Pending => {
                    status.pending_chunks.push(JobLayout::chunk_name(seq));
                    continue;
                }
            }

            let scan =
                tsv::read_table_validated(&self.layout.chunk_output(seq), RESULT_COLUMNS.len())?;
            for row in &scan.rows {
                if row[3] == STATUS_OK {
                    status.ok_records += 1;
                } else {
                    status.failed_records += 1;
                }
            }
        }

        Ok(status)
    }
}

/// 打印状态汇总（`status` 命令的输出）
pub fn print_status(status: &JobStatus) {
    info!("{}", "=".repeat(60));
    info!("📋 任务: {}", status.job_id);
    info!(
        "📦 chunk: {}/{} 完成, {} 进行中, {} 未开始",
        status.done_chunks,
        status.chunk_count,
        status.processing_chunks,
        status.pending_chunks.len()
    );
    info!(
        "📊 记录 {} 已落盘 {}/{} (成功 {}, 失败 {})",
        logging::render_bar(
            status.ok_records + status.failed_records,
            status.total_records,
            30
        ),
        status.ok_records + status.failed_records,
        status.total_records,
        status.ok_records,
        status.failed_records
    );
    if !status.pending_chunks.is_empty() {
        info!("⏸️  未开始的 chunk: {}", format_pending(&status.pending_chunks));
    }
    info!(
        "🧩 合并产物: {}",
        if status.merged { "已生成" } else { "未生成" }
    );
    info!("{}", "=".repeat(60));
}

/// 未开始的 chunk 列表, 最多列出前 10 个
fn format_pending(pending: &[String]) -> String {
    const SHOWN: usize = 10;
    if pending.len() <= SHOWN {
        pending.join(", ")
    } else {
        format!(
            "{} ... 还有 {} 个",
            pending[..SHOWN].join(", "),
            pending.len() - SHOWN
        )
    }
}
