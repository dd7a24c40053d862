//! 程序配置
//!
//! 配置来源优先级：默认值 < 配置文件 (TOML) < 环境变量。
//! Worker 子进程不继承父进程的环境，而是由编排器根据本配置
//! 显式构建执行环境（见 `orchestrator::worker::WorkerEnv`）。

use std::path::Path;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 任务目录根路径（每个 job 一个子目录）
    pub jobs_root: String,
    /// 默认每个 chunk 的记录数
    pub chunk_size: usize,
    /// 默认并行 worker 数量
    pub max_workers: usize,
    /// 瞬时失败的最大尝试次数（含首次调用）
    pub retry_max_attempts: usize,
    /// 重试退避基础等待时间（毫秒），按指数增长
    pub retry_base_delay_ms: u64,
    /// 进度轮询间隔（毫秒），仅用于展示
    pub poll_interval_ms: u64,
    /// 估算器类型: "openai" 或 "mock"
    pub estimator: String,
    /// 提示词模板存放目录
    pub prompt_dir: String,
    /// 日志过滤器（传递给 worker 的 RUST_LOG）
    pub log_filter: String,
    /// Worker 程序路径（默认使用当前可执行文件）
    pub worker_program: Option<String>,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jobs_root: ".local/jobs".to_string(),
            chunk_size: 100,
            max_workers: 5,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1000,
            poll_interval_ms: 2000,
            estimator: "openai".to_string(),
            prompt_dir: "prompts".to_string(),
            log_filter: "info".to_string(),
            worker_program: None,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
        }
    }
}

/// 配置文件的部分字段（全部可选，未出现的字段保持原值）
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    jobs_root: Option<String>,
    chunk_size: Option<usize>,
    max_workers: Option<usize>,
    retry_max_attempts: Option<usize>,
    retry_base_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    estimator: Option<String>,
    prompt_dir: Option<String>,
    log_filter: Option<String>,
    worker_program: Option<String>,
    llm_api_key: Option<String>,
    llm_api_base_url: Option<String>,
    llm_model_name: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            jobs_root: std::env::var("JOBS_ROOT").unwrap_or(default.jobs_root),
            chunk_size: std::env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.chunk_size),
            max_workers: std::env::var("MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_workers),
            retry_max_attempts: std::env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retry_max_attempts),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retry_base_delay_ms),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_interval_ms),
            estimator: std::env::var("ESTIMATOR_MODE").unwrap_or(default.estimator),
            prompt_dir: std::env::var("PROMPT_DIR").unwrap_or(default.prompt_dir),
            log_filter: std::env::var("RUST_LOG").unwrap_or(default.log_filter),
            worker_program: std::env::var("WORKER_PROGRAM")
                .ok()
                .or(default.worker_program),
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL")
                .unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }

    /// 加载配置：默认值 → 配置文件（可选） → 环境变量
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        let mut config = Self::from_env();
        if let Some(path) = config_file {
            config.apply_file(path)?;
        }
        Ok(config)
    }

    /// 将 TOML 配置文件中出现的字段覆盖到当前配置
    fn apply_file(&mut self, path: &Path) -> AppResult<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::file_read_failed(path.display().to_string(), e)
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|e| {
            ConfigError::FileParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            }
        })?;

        if let Some(v) = file.jobs_root {
            self.jobs_root = v;
        }
        if let Some(v) = file.chunk_size {
            self.chunk_size = v;
        }
        if let Some(v) = file.max_workers {
            self.max_workers = v;
        }
        if let Some(v) = file.retry_max_attempts {
            self.retry_max_attempts = v;
        }
        if let Some(v) = file.retry_base_delay_ms {
            self.retry_base_delay_ms = v;
        }
        if let Some(v) = file.poll_interval_ms {
            self.poll_interval_ms = v;
        }
        if let Some(v) = file.estimator {
            self.estimator = v;
        }
        if let Some(v) = file.prompt_dir {
            self.prompt_dir = v;
        }
        if let Some(v) = file.log_filter {
            self.log_filter = v;
        }
        if let Some(v) = file.worker_program {
            self.worker_program = Some(v);
        }
        if let Some(v) = file.llm_api_key {
            self.llm_api_key = v;
        }
        if let Some(v) = file.llm_api_base_url {
            self.llm_api_base_url = v;
        }
        if let Some(v) = file.llm_model_name {
            self.llm_model_name = v;
        }
        Ok(())
    }
}
