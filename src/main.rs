//! 程序入口：解析命令行、加载配置、分发子命令

use anyhow::Result;
use clap::Parser;
use tracing::error;

use weight_volume_batch::cli::{Cli, Commands};
use weight_volume_batch::config::Config;
use weight_volume_batch::estimator;
use weight_volume_batch::merger;
use weight_volume_batch::models::{JobLayout, JobMeta};
use weight_volume_batch::orchestrator::{self, App};
use weight_volume_batch::planner::{self, PlanRequest};
use weight_volume_batch::runner::{self, RetryPolicy};
use weight_volume_batch::utils::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置加载失败: {}", e);
            std::process::exit(2);
        }
    };
    logging::init(&config.log_filter);

    match dispatch(cli, config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("❌ {}", e);
            std::process::exit(1);
        }
    }
}

async fn dispatch(cli: Cli, config: Config) -> Result<i32> {
    match cli.command {
        Commands::Plan {
            input,
            prompt,
            chunk_size,
            chunk_count,
            name,
        } => {
            let request = PlanRequest {
                input,
                prompt_file: prompt,
                chunk_size,
                chunk_count,
                name,
            };
            let meta = planner::plan(&config, &request)?;
            // 任务 ID 输出到 stdout, 方便脚本接续
            println!("{}", meta.job_id);
            Ok(0)
        }

        Commands::Run {
            job_id,
            workers,
            resume,
            dry_run,
        } => {
            let app = App::load(config, &job_id)?;
            let summary = app.run(workers, resume, dry_run).await?;
            // 有未完成的 chunk 时以非零退出, 提示调用方续跑
            if dry_run || summary.all_done() {
                Ok(0)
            } else {
                Ok(1)
            }
        }

        Commands::RunChunk { job, chunk, resume } => {
            let layout = JobLayout::new(&config.jobs_root, &job);
            let meta = JobMeta::load(&layout)?;
            let estimator = estimator::build_estimator(&config, &meta.prompt_file)?;
            let policy = RetryPolicy::from_config(&config);
            runner::run_chunk(&layout, &meta, chunk, estimator.as_ref(), policy, resume).await?;
            Ok(0)
        }

        Commands::Status { job_id } => {
            let app = App::load(config, &job_id)?;
            let status = app.status()?;
            orchestrator::print_status(&status);
            Ok(0)
        }

        Commands::Merge { job_id } => {
            let app = App::load(config, &job_id)?;
            merger::merge(app.layout(), app.meta())?;
            Ok(0)
        }
    }
}
