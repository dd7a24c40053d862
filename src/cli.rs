//! 命令行接口
//!
//! 四个面向用户的子命令（plan / run / status / merge）加一个
//! 隐藏的内部子命令 `run-chunk`——编排器用它把自己当作 worker
//! 子进程重新启动，外部用户不应直接调用。

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// 商品体积/重量批量估算流水线
#[derive(Debug, Parser)]
#[command(name = "weight-volume-batch", version, about = "可断点续跑的并行批量估算流水线")]
pub struct Cli {
    /// 配置文件路径 (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// 切分输入数据集, 创建一个新任务
    Plan {
        /// 输入 TSV 文件 (必需列: order_id, title_origin, category)
        #[arg(long)]
        input: PathBuf,

        /// 提示词模板文件名 (位于 prompt_dir 下)
        #[arg(long, default_value = "weight-volume.v001.system.txt")]
        prompt: String,

        /// 每个 chunk 的目标记录数
        #[arg(long, conflicts_with = "chunk_count")]
        chunk_size: Option<usize>,

        /// chunk 总数 (与 --chunk-size 二选一)
        #[arg(long)]
        chunk_count: Option<usize>,

        /// 实验名前缀 (用于任务 ID)
        #[arg(long)]
        name: Option<String>,
    },

    /// 并行执行一个任务的所有未完成 chunk
    Run {
        /// 任务 ID
        job_id: String,

        /// 并发 worker 数 (默认取配置)
        #[arg(long)]
        workers: Option<usize>,

        /// 续跑模式: 保留 chunk 的已有输出, 只处理缺失的记录
        #[arg(long)]
        resume: bool,

        /// 只展示将要执行的 chunk, 不启动 worker
        #[arg(long)]
        dry_run: bool,
    },

    /// (内部) 在当前进程中处理单个 chunk
    #[command(name = "run-chunk", hide = true)]
    RunChunk {
        /// 任务 ID
        #[arg(long)]
        job: String,

        /// chunk 序号 (1 起始)
        #[arg(long)]
        chunk: usize,

        /// 续跑模式
        #[arg(long)]
        resume: bool,
    },

    /// 查看任务的执行状态
    Status {
        /// 任务 ID
        job_id: String,
    },

    /// 合并所有 chunk 的输出为最终结果
    Merge {
        /// 任务 ID
        job_id: String,
    },
}
