//! 商品体积/重量批量估算流水线
//!
//! 对大批量商品记录并行调用 LLM 做体积/重量估算，核心特性是
//! 崩溃安全与断点续跑：任何时刻中断进程，重启后只重做缺失的
//! 工作，已落盘的结果永远不会丢失或重复。
//!
//! ## 架构分层
//!
//! ```text
//! ① 切分层  planner          把数据集均衡切分为 chunk, 写就绪标记
//! ② 编排层  orchestrator     并行调度 worker 子进程, 进度监控
//! ③ 执行层  runner           单 chunk 顺序处理, 逐条落盘, 续跑
//! ④ 能力层  estimator        单条记录的估算调用 (LLM / mock)
//! ⑤ 合并层  merger           校验完整性, 去重, 产出最终结果
//! ```
//!
//! 支撑模块：`models`（数据模型与磁盘布局）、`store`（TSV 读写）、
//! `config` / `error` / `utils`。
//!
//! ## 状态约定
//!
//! 所有调度与完成判定只依据持久化标记：
//! - `.chunks_ready`: chunk 输入数据完整, 任务可以执行
//! - `.done`: chunk 输出完整刷盘, 永远不再重跑
//! - `progress.json`: 纯展示, 不参与任何判定

pub mod cli;
pub mod config;
pub mod error;
pub mod estimator;
pub mod merger;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod runner;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
