//! 编排层：任务级的并行调度
//!
//! - [`job_runner`]: `run` / `status` 命令的编排逻辑
//! - [`worker`]: worker 子进程的环境构建与生命周期
//! - [`monitor`]: 周期性的进度展示

pub mod job_runner;
pub mod monitor;
pub mod worker;

pub use job_runner::{print_status, App, JobStatus, RunSummary};
pub use worker::{launch_chunk_worker, WorkerEnv};
