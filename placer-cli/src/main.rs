//! Placer CLI
//!
//! Command-line interface for placing jobs at a remote access point.

mod commands;
mod config;

use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use config::{Backend, Config};
use placer_workflow::WorkflowConfig;
use placer_workflow::config::DEFAULT_COLLECTOR;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "placer")]
#[command(about = "Place jobs at a remote access point and collect their results", long_about = None)]
struct Cli {
    /// Collector (pool) address used to locate the access point
    #[arg(long, env = "PLACER_COLLECTOR", default_value = DEFAULT_COLLECTOR)]
    collector: String,

    /// Name of the access point to submit to
    #[arg(long, env = "PLACER_ACCESS_POINT", default_value = "localhost")]
    access_point: String,

    /// How the access point is reached
    #[arg(long, value_enum, env = "PLACER_BACKEND", default_value = "http")]
    backend: Backend,

    /// Spool directory of the local backend
    #[arg(long, env = "PLACER_LOCAL_SPOOL")]
    local_spool: Option<PathBuf>,

    /// Token file name to discover and install
    #[arg(long, env = "PLACER_TOKEN_FILE")]
    token_file: Option<String>,

    /// Directory the token is installed into
    #[arg(long, env = "PLACER_TOKEN_DIR")]
    token_dir: Option<PathBuf>,

    /// Seconds between status polls
    #[arg(long, env = "PLACER_POLL_INTERVAL", default_value_t = 10)]
    poll_interval: u64,

    /// Where retrieved results are written
    #[arg(long, env = "PLACER_RESULTS_DIR", default_value = ".")]
    results_dir: PathBuf,

    /// Where placement records are kept
    #[arg(long, env = "PLACER_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Branch of the companion content deployed with this session
    #[arg(long, env = "PLACER_CONTENT_BRANCH")]
    content_branch: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn config(&self) -> Config {
        let mut workflow = WorkflowConfig::new(self.collector.clone(), self.access_point.clone())
            .with_poll_interval(Duration::from_secs(self.poll_interval))
            .with_results_dir(self.results_dir.clone());

        if let Some(name) = &self.token_file {
            workflow.token_filename = name.clone();
        }
        if let Some(dir) = &self.token_dir {
            workflow = workflow.with_token_dir(dir.clone());
        }
        if let Some(dir) = &self.state_dir {
            workflow = workflow.with_state_dir(dir.clone());
        }
        workflow.content_branch = self.content_branch.clone().filter(|b| !b.is_empty());

        let local_spool = self
            .local_spool
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("placer-spool"));

        Config {
            workflow,
            backend: self.backend,
            local_spool,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "placer=info,placer_workflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        return ExitCode::from(1);
    }

    match handle_command(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
