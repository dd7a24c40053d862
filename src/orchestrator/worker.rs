//! Worker 进程管理
//!
//! 编排器为每个 chunk 启动一个独立的 worker 子进程（本程序自身的
//! `run-chunk` 子命令）。子进程不继承父进程环境：执行环境由
//! [`WorkerEnv`] 根据配置显式构建，只透传白名单内的系统变量。
//! worker 的 stdout/stderr 全部重定向到该 chunk 的 run.log。

use std::path::PathBuf;
use std::process::Stdio;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppResult, WorkerError};
use crate::models::JobLayout;

/// 透传给 worker 的系统环境变量白名单
const PASSTHROUGH_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    "HTTPS_PROXY",
    "HTTP_PROXY",
    "NO_PROXY",
];

/// Worker 子进程的执行环境
#[derive(Clone, Debug)]
pub struct WorkerEnv {
    program: PathBuf,
    vars: Vec<(String, String)>,
}

impl WorkerEnv {
    /// 根据配置构建 worker 执行环境
    ///
    /// # 返回
    /// worker 程序不可定位时返回 `WorkerError::EnvironmentSetup`
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let program = match &config.worker_program {
            Some(path) => PathBuf::from(path),
            None => std::env::current_exe()
                .map_err(|e| crate::error::AppError::env_setup_failed("*", e))?,
        };

        let mut vars: Vec<(String, String)> = Vec::new();
        for name in PASSTHROUGH_VARS {
            if let Ok(value) = std::env::var(name) {
                vars.push((name.to_string(), value));
            }
        }

        // 配置派生的变量：worker 进程从这些变量重建自己的 Config
        vars.push(("JOBS_ROOT".to_string(), config.jobs_root.clone()));
        vars.push(("PROMPT_DIR".to_string(), config.prompt_dir.clone()));
        vars.push(("ESTIMATOR_MODE".to_string(), config.estimator.clone()));
        vars.push((
            "RETRY_MAX_ATTEMPTS".to_string(),
            config.retry_max_attempts.to_string(),
        ));
        vars.push((
            "RETRY_BASE_DELAY_MS".to_string(),
            config.retry_base_delay_ms.to_string(),
        ));
        vars.push(("LLM_API_KEY".to_string(), config.llm_api_key.clone()));
        vars.push((
            "LLM_API_BASE_URL".to_string(),
            config.llm_api_base_url.clone(),
        ));
        vars.push(("LLM_MODEL_NAME".to_string(), config.llm_model_name.clone()));
        vars.push(("RUST_LOG".to_string(), config.log_filter.clone()));

        Ok(Self { program, vars })
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

/// 启动并等待一个 chunk 的 worker 子进程
///
/// # 返回
/// - `Ok(true)`: worker 零退出
/// - `Ok(false)`: worker 非零退出（chunk 保持未完成，可续跑）
/// - `Err`: 进程无法启动（环境故障）
pub async fn launch_chunk_worker(
    env: &WorkerEnv,
    layout: &JobLayout,
    seq: usize,
    resume: bool,
) -> AppResult<bool> {
    let chunk_id = JobLayout::chunk_name(seq);

    // worker 的所有输出进入该 chunk 自己的 run.log
    let log_path = layout.chunk_log(seq);
    let log_file = std::fs::File::create(&log_path)
        .map_err(|e| crate::error::AppError::file_write_failed(log_path.display().to_string(), e))?;
    let log_stderr = log_file
        .try_clone()
        .map_err(|e| crate::error::AppError::env_setup_failed(&chunk_id, e))?;

    let mut command = tokio::process::Command::new(&env.program);
    command
        .arg("run-chunk")
        .arg("--job")
        .arg(layout.job_id())
        .arg("--chunk")
        .arg(seq.to_string());
    if resume {
        command.arg("--resume");
    }
    command
        .env_clear()
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_stderr));

    debug!(
        "启动 worker: {} run-chunk --job {} --chunk {}",
        env.program.display(),
        layout.job_id(),
        seq
    );

    let mut child = command.spawn().map_err(|e| WorkerError::EnvironmentSetup {
        chunk_id: chunk_id.clone(),
        source: Box::new(e),
    })?;

    info!("👷 chunk {} 的 worker 已启动", chunk_id);

    let status = child
        .wait()
        .await
        .map_err(|e| crate::error::AppError::env_setup_failed(&chunk_id, e))?;

    if !status.success() {
        let failure = WorkerError::NonZeroExit {
            chunk_id: chunk_id.clone(),
            code: status.code(),
        };
        tracing::error!("❌ {}", failure);
        return Ok(false);
    }

    Ok(true)
}
