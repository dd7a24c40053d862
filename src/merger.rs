//! Result Merger - 合并层
//!
//! ## 职责
//!
//! 把所有 chunk 的输出合并为最终结果文件：
//!
//! 1. **完整性前置校验**：任何 chunk 缺少 .done 标记就拒绝合并，
//!    且拒绝发生在写任何文件之前
//! 2. **去重**：同一 order_id 只保留第一次出现（按 chunk 序号升序）
//! 3. **确定性**：同样的输入，重复合并产出字节级相同的文件
//! 4. **原子落盘**：先写临时文件再 rename，不存在半写的合并产物
//!
//! 损坏的输出行（字段数不符）在合并时丢弃并告警——能走到合并
//! 这一步说明对应 chunk 已有 .done，损坏只可能来自外部篡改。

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::{AppResult, JobError};
use crate::models::{JobLayout, JobMeta, RESULT_COLUMNS, STATUS_OK};
use crate::store::tsv;

/// 一次合并的统计
#[derive(Clone, Debug, Default)]
pub struct MergeReport {
    pub chunks: usize,
    /// 合并产物中的记录数
    pub rows: usize,
    pub ok: usize,
    pub failed: usize,
    /// 因重复 order_id 被丢弃的行数
    pub duplicates_dropped: usize,
    pub output: String,
}

/// 合并一个任务的所有 chunk 输出
///
/// # 返回
/// 存在未完成 chunk 时返回 `JobError::Incomplete`，此时不写任何文件
pub fn merge(layout: &JobLayout, meta: &JobMeta) -> AppResult<MergeReport> {
    // 完整性校验先于一切写操作
    let missing: Vec<String> = (1..=meta.chunk_count)
        .filter(|seq| !layout.chunk_done_marker(*seq).exists())
        .map(JobLayout::chunk_name)
        .collect();
    if !missing.is_empty() {
        return Err(JobError::Incomplete {
            job_id: meta.job_id.clone(),
            missing,
        }
        .into());
    }

    info!("🧩 开始合并 {} 个 chunk: {}", meta.chunk_count, meta.job_id);

    let header: Vec<String> = RESULT_COLUMNS.iter().map(|s| s.to_string()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<Vec<String>> = Vec::new();
    let mut report = MergeReport {
        chunks: meta.chunk_count,
        output: layout.final_result().display().to_string(),
        ..MergeReport::default()
    };

    // chunk 升序遍历保证确定性；同一 id 保留首次出现
    for seq in 1..=meta.chunk_count {
        let output_path = layout.chunk_output(seq);
        let scan = tsv::read_table_validated(&output_path, RESULT_COLUMNS.len())?;
        for (line_num, fields) in &scan.discarded {
            let corrupt = JobError::CorruptOutput {
                path: output_path.display().to_string(),
                line_num: *line_num,
                fields: *fields,
                expected: RESULT_COLUMNS.len(),
            };
            warn!("合并时丢弃损坏行: {}", corrupt);
        }

        for row in scan.rows {
            if !seen.insert(row[0].clone()) {
                report.duplicates_dropped += 1;
                continue;
            }
            if row[3] == STATUS_OK {
                report.ok += 1;
            } else {
                report.failed += 1;
            }
            merged.push(row);
        }
    }

    report.rows = merged.len();
    tsv::write_table_atomic(&layout.final_result(), &header, &merged)?;

    info!(
        "✅ 合并完成: {} 条记录 (成功 {}, 失败 {}), 去重丢弃 {} 条 -> {}",
        report.rows, report.ok, report.failed, report.duplicates_dropped, report.output
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::STATUS_FAILED;

    fn result_row(order_id: &str, status: &str) -> Vec<String> {
        let mut row: Vec<String> = vec![String::new(); RESULT_COLUMNS.len()];
        row[0] = order_id.to_string();
        row[3] = status.to_string();
        row
    }

    fn setup(dir: &std::path::Path, chunk_count: usize) -> (JobLayout, JobMeta) {
        let layout = JobLayout::new(dir, "job-m");
        for seq in 1..=chunk_count {
            std::fs::create_dir_all(layout.chunk_dir(seq)).unwrap();
        }
        let meta = JobMeta {
            job_id: "job-m".to_string(),
            created_at: String::new(),
            input_file: String::new(),
            prompt_file: String::new(),
            total_records: 0,
            chunk_size: 0,
            chunk_count,
        };
        (layout, meta)
    }

    fn write_chunk_output(layout: &JobLayout, seq: usize, rows: &[Vec<String>], done: bool) {
        let header: Vec<String> = RESULT_COLUMNS.iter().map(|s| s.to_string()).collect();
        tsv::write_table_atomic(&layout.chunk_output(seq), &header, rows).unwrap();
        if done {
            std::fs::write(layout.chunk_done_marker(seq), "").unwrap();
        }
    }

    #[test]
    fn test_merge_refuses_incomplete_job() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup(dir.path(), 2);
        write_chunk_output(&layout, 1, &[result_row("A", STATUS_OK)], true);
        write_chunk_output(&layout, 2, &[result_row("B", STATUS_OK)], false);

        let err = merge(&layout, &meta).unwrap_err();
        match err {
            AppError::Job(JobError::Incomplete { missing, .. }) => {
                assert_eq!(missing, vec!["0002"]);
            }
            other => panic!("意外的错误: {}", other),
        }
        // 拒绝合并时不落任何文件
        assert!(!layout.final_result().exists());
    }

    #[test]
    fn test_merge_dedupes_by_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup(dir.path(), 2);
        let mut dup = result_row("B", STATUS_FAILED);
        dup[1] = "来自 chunk 1".to_string();
        write_chunk_output(&layout, 1, &[result_row("A", STATUS_OK), dup], true);
        let mut dup2 = result_row("B", STATUS_OK);
        dup2[1] = "来自 chunk 2".to_string();
        write_chunk_output(&layout, 2, &[dup2, result_row("C", STATUS_OK)], true);

        let report = merge(&layout, &meta).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(report.ok, 2);
        assert_eq!(report.failed, 1);

        // 保留的是 chunk 1 中的首次出现
        let (_, rows) = tsv::read_table(&layout.final_result()).unwrap();
        let b = rows.iter().find(|r| r[0] == "B").unwrap();
        assert_eq!(b[1], "来自 chunk 1");
    }

    #[test]
    fn test_merge_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup(dir.path(), 2);
        write_chunk_output(
            &layout,
            1,
            &[result_row("A", STATUS_OK), result_row("B", STATUS_OK)],
            true,
        );
        write_chunk_output(&layout, 2, &[result_row("C", STATUS_FAILED)], true);

        merge(&layout, &meta).unwrap();
        let first = std::fs::read(layout.final_result()).unwrap();
        merge(&layout, &meta).unwrap();
        let second = std::fs::read(layout.final_result()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_keeps_failed_records() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, meta) = setup(dir.path(), 1);
        write_chunk_output(
            &layout,
            1,
            &[result_row("A", STATUS_OK), result_row("B", STATUS_FAILED)],
            true,
        );

        let report = merge(&layout, &meta).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.failed, 1);
    }
}
