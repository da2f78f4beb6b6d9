//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod placement;
mod run;
mod token;

pub use token::TokenCommands;

use clap::Subcommand;
use placer_workflow::{PlacementWorkflow, WorkflowError};
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Placement token management
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Submit a job description and record the placement
    Submit {
        /// Job description file
        file: PathBuf,

        /// Write outputs directly to the shared filesystem instead of spooling
        #[arg(long)]
        no_spool: bool,
    },
    /// Show the status of a placement
    Status {
        /// Cluster id of the placement
        cluster: u64,
    },
    /// Wait for the jobs of a placement to finish
    Monitor {
        /// Cluster id of the placement
        cluster: u64,

        /// Give up after this many minutes (default: wait until done)
        #[arg(long)]
        minutes: Option<f64>,
    },
    /// Retrieve the results of completed jobs
    Retrieve {
        /// Cluster id of the placement
        cluster: u64,
    },
    /// Install the token, submit, monitor and retrieve in one go
    Run {
        /// Job description file
        file: PathBuf,

        /// Token file to install (default: discover it)
        #[arg(long)]
        token: Option<PathBuf>,

        /// Use the token that is already installed
        #[arg(long, conflicts_with = "token")]
        installed_token: bool,

        /// Give up monitoring after this many minutes (default: wait until done)
        #[arg(long)]
        minutes: Option<f64>,

        /// Write outputs directly to the shared filesystem instead of spooling
        #[arg(long)]
        no_spool: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<(), WorkflowError> {
    let workflow = PlacementWorkflow::new(config.workflow.clone(), config.client());

    match command {
        Commands::Token { command } => token::handle_token_command(command, &workflow),
        Commands::Submit { file, no_spool } => {
            placement::submit(&workflow, file, !no_spool).await
        }
        Commands::Status { cluster } => placement::status(&workflow, cluster).await,
        Commands::Monitor { cluster, minutes } => {
            placement::monitor(&workflow, cluster, minutes.unwrap_or(f64::INFINITY)).await
        }
        Commands::Retrieve { cluster } => placement::retrieve(&workflow, cluster).await,
        Commands::Run {
            file,
            token,
            installed_token,
            minutes,
            no_spool,
        } => {
            run::run(
                &workflow,
                run::RunArgs {
                    file,
                    token,
                    installed_token,
                    minutes: minutes.unwrap_or(f64::INFINITY),
                    spool: !no_spool,
                },
            )
            .await
        }
    }
}
