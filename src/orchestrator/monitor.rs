//! 进度监控
//!
//! 编排器侧的周期性进度展示：轮询各 chunk 的持久化状态与
//! progress.json 快照，渲染进度条。纯展示逻辑——快照缺失或
//! 过期只影响显示的数字，不影响任何调度决策。

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::models::{ChunkState, JobLayout, JobMeta};
use crate::runner::progress;
use crate::utils::logging::render_bar;

/// 启动后台监控任务
///
/// 返回的 JoinHandle 由调用方在所有 worker 结束后 abort。
pub fn spawn_monitor(layout: JobLayout, meta: JobMeta, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            report_once(&layout, &meta);
        }
    })
}

/// 输出一次整体进度
fn report_once(layout: &JobLayout, meta: &JobMeta) {
    let sizes = meta.chunk_sizes();
    let mut overall_done = 0usize;
    let mut done_chunks = 0usize;

    for seq in 1..=meta.chunk_count {
        let size = sizes[seq - 1];
        match layout.chunk_state(seq) {
            ChunkState::Done => {
                overall_done += size;
                done_chunks += 1;
            }
            ChunkState::Processing => {
                // 快照是尽力而为的展示数据，读不到按 0 计
                let processed = progress::read_snapshot(&layout.chunk_progress(seq))
                    .map(|s| s.processed.min(size))
                    .unwrap_or(0);
                overall_done += processed;
                info!(
                    "  chunk {} {} {}/{}",
                    JobLayout::chunk_name(seq),
                    render_bar(processed, size, 20),
                    processed,
                    size
                );
            }
            ChunkState::Pending => {}
        }
    }

    info!(
        "📊 总进度 {} {}/{} 条记录, {}/{} 个 chunk 完成",
        render_bar(overall_done, meta.total_records, 30),
        overall_done,
        meta.total_records,
        done_chunks,
        meta.chunk_count
    );
}
