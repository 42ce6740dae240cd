use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use syncwatch::cli::{tui, watch};
use syncwatch::config::AppConfig;
use syncwatch::context::AppContext;
use syncwatch::jobs::{JobConfig, JobId, SyncType, split_filters};
use syncwatch::logging::{self, LogConfig};

/// Progress lines from `sync` are logged at most this often.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "syncwatch")]
#[command(about = "Start and watch post-mortem ingestion syncs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Config file (defaults to ./syncwatch.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://localhost:8080/api
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[arg(long, global = true)]
    verbose: bool,

    /// Log as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

/// CLI values layered over file and environment configuration.
#[derive(Serialize)]
struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    json_logs: Option<bool>,
}

impl From<&GlobalArgs> for ConfigOverrides {
    fn from(args: &GlobalArgs) -> Self {
        Self {
            api_url: args.api_url.clone(),
            verbose: args.verbose.then_some(true),
            json_logs: args.json_logs.then_some(true),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start a sync and follow it until it finishes
    Sync(SyncArgs),
    /// Fetch the current status of a sync once
    Status { sync_id: String },
    /// Interactive dashboard
    Dashboard,
}

#[derive(Args)]
struct SyncArgs {
    #[arg(long)]
    sync_type: Option<SyncType>,

    /// Comma-separated space keys
    #[arg(long)]
    spaces: Option<String>,

    /// Comma-separated tags
    #[arg(long)]
    tags: Option<String>,

    /// Maximum number of pages to process
    #[arg(long)]
    limit: Option<u32>,

    /// Print the sync id and exit without following
    #[arg(long)]
    detach: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides::from(&cli.global);
    let config = AppConfig::load(cli.global.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")?;

    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        stderr: !matches!(cli.command, Commands::Dashboard),
    });

    let ctx = AppContext::new(config).context("Failed to build backend client")?;

    match &cli.command {
        Commands::Sync(args) => run_sync(ctx, args).await,
        Commands::Status { sync_id } => run_status(ctx, sync_id).await,
        Commands::Dashboard => {
            tui::run(ctx).await.context("Dashboard failed")?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_sync(ctx: AppContext, args: &SyncArgs) -> Result<ExitCode> {
    let defaults = ctx.default_job_config();
    let job_config = JobConfig {
        sync_type: args.sync_type.unwrap_or(defaults.sync_type),
        spaces: match &args.spaces {
            Some(spaces) => split_filters(spaces),
            None => defaults.spaces,
        },
        tags: match &args.tags {
            Some(tags) => split_filters(tags),
            None => defaults.tags,
        },
        limit: args.limit,
    };

    let mut tracker = ctx.tracker();
    let id = tracker
        .start_job(job_config)
        .await
        .context("Failed to start sync")?;
    println!("{}", id);

    if args.detach {
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = watch::follow(tracker.subscribe(), &id, PROGRESS_LOG_INTERVAL).await;
    tracker.teardown();

    match outcome {
        Some(job) => {
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(if watch::succeeded(&job) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => Ok(ExitCode::FAILURE),
    }
}

async fn run_status(ctx: AppContext, sync_id: &str) -> Result<ExitCode> {
    let record = ctx
        .client
        .poll(&JobId::from(sync_id))
        .await
        .with_context(|| format!("Failed to fetch status of sync {}", sync_id))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(ExitCode::SUCCESS)
}
