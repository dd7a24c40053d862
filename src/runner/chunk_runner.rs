//! Chunk Runner - 执行层
//!
//! ## 职责
//!
//! 在单个 worker 进程内顺序处理一个 chunk 的所有记录：
//!
//! 1. **幂等入口**：`.done` 已存在则整个 chunk 直接跳过
//! 2. **断点续跑**：扫描已有输出，只处理盘上没有的记录
//! 3. **逐条落盘**：每条记录写入后立即刷盘，中断最多丢一条在途记录
//! 4. **记录级隔离**：单条记录失败以 failed 状态落盘，绝不中止 chunk
//! 5. **提交点**：输出完整刷盘并关闭后才写 `.done` 标记
//!
//! 续跑判定只依据输出文件内容（持久化状态），progress.json 只用于展示。

use std::collections::HashSet;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::{AppResult, JobError};
use crate::estimator::Estimator;
use crate::models::{InputColumns, JobLayout, JobMeta, ResultRecord, RESULT_COLUMNS};
use crate::runner::progress::{self, ProgressSnapshot};
use crate::runner::retry::RetryPolicy;
use crate::store::tsv::{self, TsvAppender};

/// 一次 chunk 执行的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkReport {
    /// 本次实际处理（调用估算）的记录数
    pub processed: usize,
    /// 本次处理中成功的记录数
    pub succeeded: usize,
    /// 本次处理中失败的记录数（以 failed 状态落盘）
    pub failed: usize,
    /// 续跑时跳过的已完成记录数
    pub skipped: usize,
}

/// 处理一个 chunk
///
/// # 参数
/// - `seq`: chunk 序号（1 起始）
/// - `resume`: true 时保留已有输出并跳过其中的记录；false 时从头重跑
///
/// # 返回
/// 返回执行统计；只有 chunk 级故障（输入缺失、输出不可写）才返回错误，
/// 记录级失败会落盘后继续
pub async fn run_chunk(
    layout: &JobLayout,
    meta: &JobMeta,
    seq: usize,
    estimator: &dyn Estimator,
    policy: RetryPolicy,
    resume: bool,
) -> AppResult<ChunkReport> {
    let chunk_id = JobLayout::chunk_name(seq);

    // .done 是唯一的完成依据：存在即跳过，无论 resume 与否
    if layout.chunk_done_marker(seq).exists() {
        info!("⏭️  chunk {} 已有 .done 标记, 跳过", chunk_id);
        let sizes = meta.chunk_sizes();
        return Ok(ChunkReport {
            skipped: sizes.get(seq - 1).copied().unwrap_or(0),
            ..ChunkReport::default()
        });
    }

    let input_path = layout.chunk_input(seq);
    let (header, rows) = tsv::read_table(&input_path)?;
    let columns = InputColumns::resolve(&header, &input_path.display().to_string())?;
    let total = rows.len();

    let output_path = layout.chunk_output(seq);
    let (mut appender, processed_ids) = if resume && output_path.exists() {
        open_resumed_output(layout, seq)?
    } else {
        // 从头重跑：截断已有输出
        (
            TsvAppender::create(&output_path, &result_header())?,
            HashSet::new(),
        )
    };

    log_chunk_start(&chunk_id, total, processed_ids.len(), estimator.name());

    let progress_path = layout.chunk_progress(seq);
    let started = Instant::now();
    let mut report = ChunkReport::default();

    for row in &rows {
        let record = columns.record_from_row(row);

        if processed_ids.contains(&record.order_id) {
            report.skipped += 1;
            continue;
        }

        progress::write_snapshot(
            &progress_path,
            &ProgressSnapshot::running(
                report.skipped + report.processed,
                total,
                &record.order_id,
                started.elapsed().as_secs(),
            ),
        );

        let result = match estimate_with_retry(estimator, &record, policy).await {
            Ok(estimate) => {
                report.succeeded += 1;
                info!(
                    "  ✓ [{}/{}] {} {} ({} kg)",
                    report.skipped + report.processed + 1,
                    total,
                    record.order_id,
                    crate::utils::logging::truncate_text(&record.title, 20),
                    estimate.weight_kg
                );
                ResultRecord::success(&record, &estimate, &chunk_id)
            }
            Err(reason) => {
                report.failed += 1;
                warn!(
                    "  ✗ [{}/{}] {} 估算失败: {}",
                    report.skipped + report.processed + 1,
                    total,
                    record.order_id,
                    reason
                );
                ResultRecord::failure(&record, &reason, &chunk_id)
            }
        };

        // 逐条刷盘：这行返回后该记录就是持久的
        appender.append_row(&result.to_row())?;
        report.processed += 1;
    }

    // 提交点：输出全量落盘并关闭之后才写 .done
    appender.finish()?;
    std::fs::write(layout.chunk_done_marker(seq), "").map_err(|e| {
        crate::error::AppError::file_write_failed(
            layout.chunk_done_marker(seq).display().to_string(),
            e,
        )
    })?;

    progress::write_snapshot(
        &progress_path,
        &ProgressSnapshot::completed(total, started.elapsed().as_secs()),
    );

    log_chunk_complete(&chunk_id, &report, started.elapsed().as_secs());
    Ok(report)
}

/// 续跑时打开已有输出
///
/// 扫描盘上的输出行，丢弃字段数不符的损坏行（半写的尾行），
/// 把保留行原子重写后以追加模式打开，返回已完成记录的 id 集合。
/// 表头不符说明输出来自不同版本的列定义，整个文件不可信，从头重建。
fn open_resumed_output(
    layout: &JobLayout,
    seq: usize,
) -> AppResult<(TsvAppender, HashSet<String>)> {
    let output_path = layout.chunk_output(seq);
    let scan = tsv::read_table_validated(&output_path, RESULT_COLUMNS.len())?;

    if scan.header != result_header() {
        warn!(
            "chunk {} 的输出表头不符, 从头重建: {}",
            JobLayout::chunk_name(seq),
            output_path.display()
        );
        return Ok((
            TsvAppender::create(&output_path, &result_header())?,
            HashSet::new(),
        ));
    }

    for (line_num, fields) in &scan.discarded {
        let corrupt = JobError::CorruptOutput {
            path: output_path.display().to_string(),
            line_num: *line_num,
            fields: *fields,
            expected: RESULT_COLUMNS.len(),
        };
        warn!("丢弃损坏行并重新处理该记录: {}", corrupt);
    }

    let processed_ids: HashSet<String> = scan.rows.iter().map(|row| row[0].clone()).collect();

    // 原子重写保留行：物理清除损坏行，避免追加写接在半行后面
    tsv::write_table_atomic(&output_path, &result_header(), &scan.rows)?;
    let appender = TsvAppender::open_append(&output_path)?;

    if !processed_ids.is_empty() {
        info!(
            "🔁 chunk {} 续跑: 盘上已有 {} 条记录",
            JobLayout::chunk_name(seq),
            processed_ids.len()
        );
    }

    Ok((appender, processed_ids))
}

/// 对单条记录做带重试的估算
///
/// 只重试瞬时失败；重试耗尽或永久失败时返回错误文本，
/// 由调用方降级为记录级的 failed 行。
async fn estimate_with_retry(
    estimator: &dyn Estimator,
    record: &crate::models::InputRecord,
    policy: RetryPolicy,
) -> Result<crate::models::Estimate, String> {
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        match estimator.estimate(record).await {
            Ok(estimate) => return Ok(estimate),
            Err(err) => {
                if err.is_transient() && attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "  ⏳ {} 第 {}/{} 次尝试失败, {:?} 后重试: {}",
                        record.order_id,
                        attempt,
                        policy.max_attempts,
                        delay,
                        err.reason()
                    );
                    tokio::time::sleep(delay).await;
                    last_error = err.to_string();
                } else {
                    return Err(err.to_string());
                }
            }
        }
    }
    Err(last_error)
}

fn result_header() -> Vec<String> {
    RESULT_COLUMNS.iter().map(|s| s.to_string()).collect()
}

// ========== 日志辅助函数 ==========

fn log_chunk_start(chunk_id: &str, total: usize, already_done: usize, estimator: &str) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 开始处理 chunk {}: {} 条记录 (已完成 {}), 估算器: {}",
        chunk_id, total, already_done, estimator
    );
    info!("{}", "=".repeat(60));
}

fn log_chunk_complete(chunk_id: &str, report: &ChunkReport, elapsed_secs: u64) {
    info!("{}", "-".repeat(60));
    info!(
        "✅ chunk {} 完成: 处理 {} 条 (成功 {}, 失败 {}), 跳过 {} 条, 耗时 {}s",
        chunk_id, report.processed, report.succeeded, report.failed, report.skipped, elapsed_secs
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::CallError;
    use crate::estimator::MockEstimator;
    use crate::models::{Estimate, InputRecord};

    /// 前 `fail_times` 次调用返回瞬时失败，之后成功
    struct FlakyEstimator {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Estimator for FlakyEstimator {
        async fn estimate(&self, _record: &InputRecord) -> Result<Estimate, CallError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(CallError::transient("模拟超时"))
            } else {
                Ok(Estimate {
                    volume: "10x10x10".to_string(),
                    packed_volume: String::new(),
                    weight_kg: 1.0,
                    reason: String::new(),
                })
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// 永远返回永久失败
    struct AlwaysPermanentFail;

    #[async_trait]
    impl Estimator for AlwaysPermanentFail {
        async fn estimate(&self, _record: &InputRecord) -> Result<Estimate, CallError> {
            Err(CallError::permanent("响应无法解析"))
        }

        fn name(&self) -> &str {
            "always-fail"
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    /// 搭建一个只有 1 个 chunk、n 条记录的任务
    fn setup_job(dir: &std::path::Path, n: usize) -> (JobLayout, JobMeta) {
        let layout = JobLayout::new(dir, "test-job");
        std::fs::create_dir_all(layout.chunk_dir(1)).unwrap();

        let header: Vec<String> = ["order_id", "title_origin", "category"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows: Vec<Vec<String>> = (0..n)
            .map(|i| vec![format!("R-{:04}", i), format!("商品{}", i), "类目".to_string()])
            .collect();
        tsv::write_table_atomic(&layout.chunk_input(1), &header, &rows).unwrap();

        let meta = JobMeta {
            job_id: "test-job".to_string(),
            created_at: String::new(),
            input_file: String::new(),
            prompt_file: String::new(),
            total_records: n,
            chunk_size: n,
            chunk_count: 1,
        };
        (layout, meta)
    }

    fn output_ids(layout: &JobLayout) -> Vec<String> {
        let (_, rows) = tsv::read_table(&layout.chunk_output(1)).unwrap();
        rows.iter().map(|r| r[0].clone()).collect()
    }

    #[tokio::test]
    async fn test_run_chunk_full_pass() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup_job(dir.path(), 5);

        let estimator = MockEstimator::new();
        let report = run_chunk(&layout, &meta, 1, &estimator, fast_policy(), false)
            .await
            .unwrap();

        assert_eq!(report.processed, 5);
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, 0);
        assert!(layout.chunk_done_marker(1).exists());
        assert_eq!(output_ids(&layout).len(), 5);

        let snapshot = progress::read_snapshot(&layout.chunk_progress(1)).unwrap();
        assert_eq!(snapshot.phase, "completed");
    }

    #[tokio::test]
    async fn test_done_chunk_is_never_reprocessed() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup_job(dir.path(), 5);

        let estimator = MockEstimator::new();
        run_chunk(&layout, &meta, 1, &estimator, fast_policy(), false)
            .await
            .unwrap();
        let before = std::fs::read_to_string(layout.chunk_output(1)).unwrap();

        // resume 和 fresh 两种模式下 .done 都生效
        for resume in [true, false] {
            let report = run_chunk(&layout, &meta, 1, &estimator, fast_policy(), resume)
                .await
                .unwrap();
            assert_eq!(report.processed, 0);
            assert_eq!(report.skipped, 5);
        }
        assert_eq!(
            std::fs::read_to_string(layout.chunk_output(1)).unwrap(),
            before
        );
    }

    #[tokio::test]
    async fn test_resume_processes_only_missing_records() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup_job(dir.path(), 5);
        let estimator = MockEstimator::new();

        run_chunk(&layout, &meta, 1, &estimator, fast_policy(), false)
            .await
            .unwrap();

        // 模拟中断：去掉 .done, 截掉最后两条完整记录, 留下一个半写的尾行
        std::fs::remove_file(layout.chunk_done_marker(1)).unwrap();
        let content = std::fs::read_to_string(layout.chunk_output(1)).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        lines.truncate(lines.len() - 2);
        let truncated = format!("{}\nR-0004\t半写的", lines.join("\n"));
        std::fs::write(layout.chunk_output(1), truncated).unwrap();

        let report = run_chunk(&layout, &meta, 1, &estimator, fast_policy(), true)
            .await
            .unwrap();

        // 盘上剩 3 条完整记录; 2 条被截掉的 + 1 条半写的要重新处理
        assert_eq!(report.skipped, 3);
        assert_eq!(report.processed, 2);
        assert!(layout.chunk_done_marker(1).exists());

        // 最终输出：每条记录恰好一次，无损坏行
        let mut ids = output_ids(&layout);
        ids.sort();
        assert_eq!(ids, vec!["R-0000", "R-0001", "R-0002", "R-0003", "R-0004"]);
    }

    #[tokio::test]
    async fn test_fresh_mode_truncates_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup_job(dir.path(), 3);
        let estimator = MockEstimator::new();

        run_chunk(&layout, &meta, 1, &estimator, fast_policy(), false)
            .await
            .unwrap();
        std::fs::remove_file(layout.chunk_done_marker(1)).unwrap();

        let report = run_chunk(&layout, &meta, 1, &estimator, fast_policy(), false)
            .await
            .unwrap();

        // 从头重跑：全部重新处理，输出不重复
        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(output_ids(&layout).len(), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup_job(dir.path(), 1);

        let estimator = FlakyEstimator {
            fail_times: 2,
            calls: AtomicU32::new(0),
        };
        let report = run_chunk(&layout, &meta, 1, &estimator, fast_policy(), false)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_failed_record() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup_job(dir.path(), 1);

        let estimator = FlakyEstimator {
            fail_times: 99,
            calls: AtomicU32::new(0),
        };
        let report = run_chunk(&layout, &meta, 1, &estimator, fast_policy(), false)
            .await
            .unwrap();

        // 重试耗尽降级为记录级失败，chunk 照常完成
        assert_eq!(report.failed, 1);
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 3);
        assert!(layout.chunk_done_marker(1).exists());
    }

    #[tokio::test]
    async fn test_permanent_failure_does_not_abort_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup_job(dir.path(), 3);

        let report = run_chunk(&layout, &meta, 1, &AlwaysPermanentFail, fast_policy(), false)
            .await
            .unwrap();

        // 所有记录以 failed 状态落盘，chunk 正常提交
        assert_eq!(report.failed, 3);
        assert!(layout.chunk_done_marker(1).exists());

        let (_, rows) = tsv::read_table(&layout.chunk_output(1)).unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(row[3], crate::models::STATUS_FAILED);
            assert!(!row[11].is_empty());
        }
    }
}
