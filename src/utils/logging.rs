//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// # 参数
/// - `filter`: 默认日志过滤器（被 RUST_LOG 环境变量覆盖）
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.to_string()));

    // Worker 子进程与编排器可能共用同一进程内的测试环境，重复初始化时静默忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(job_id: &str, max_workers: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 启动批量估算 - 任务: {}", job_id);
    info!("📊 最大并发 worker 数: {}", max_workers);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `succeeded`: 本次运行完成的 chunk 数
/// - `failed`: 本次运行失败的 chunk 数
/// - `already_done`: 启动时已完成（被跳过）的 chunk 数
/// - `total`: chunk 总数
pub fn print_final_stats(succeeded: usize, failed: usize, already_done: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 运行完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 本次完成: {}", succeeded);
    info!("⏭️ 启动时已完成: {}", already_done);
    info!("❌ 失败: {}", failed);
    info!("📦 chunk 总数: {}", total);
    info!("{}", "=".repeat(60));
}

/// 渲染文本进度条，如 `████████░░░░`
///
/// # 参数
/// - `current`: 当前进度
/// - `total`: 总量
/// - `width`: 进度条字符宽度
pub fn render_bar(current: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return "░".repeat(width);
    }
    let filled = (width * current.min(total)) / total;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_bar() {
        assert_eq!(render_bar(0, 10, 10), "░░░░░░░░░░");
        assert_eq!(render_bar(5, 10, 10), "█████░░░░░");
        assert_eq!(render_bar(10, 10, 10), "██████████");
        // 超过总量时封顶
        assert_eq!(render_bar(15, 10, 10), "██████████");
        // 总量为 0 时不除零
        assert_eq!(render_bar(0, 0, 4), "░░░░");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("一二三四五", 3), "一二三...");
    }
}
