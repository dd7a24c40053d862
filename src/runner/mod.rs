//! 执行层：单 worker 进程内的 chunk 处理
//!
//! - [`chunk_runner`]: 顺序处理一个 chunk，逐条落盘、断点续跑
//! - [`retry`]: 记录级的有界重试策略
//! - [`progress`]: 纯展示用途的进度快照

pub mod chunk_runner;
pub mod progress;
pub mod retry;

pub use chunk_runner::{run_chunk, ChunkReport};
pub use progress::ProgressSnapshot;
pub use retry::RetryPolicy;
