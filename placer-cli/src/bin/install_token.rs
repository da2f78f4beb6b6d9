//! install-token
//!
//! Installs a placement token for the invoking user. Prints `OK` on success;
//! on failure prints the reason on stderr and exits with a code per failure
//! class (2 not found, 3 invalid source, 4 install failed, 1 bad options).

use clap::Parser;
use placer_workflow::{CredentialInstaller, WorkflowConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "install-token")]
#[command(about = "Install a placement token with owner-only permissions", long_about = None)]
struct Args {
    /// Token file (default: look in the current and home directories)
    path: Option<PathBuf>,

    /// Token file name to look for
    #[arg(long, env = "PLACER_TOKEN_FILE")]
    token_file: Option<String>,

    /// Directory the token is installed into
    #[arg(long, env = "PLACER_TOKEN_DIR")]
    token_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "placer_workflow=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = WorkflowConfig::default();
    if let Some(name) = args.token_file {
        config.token_filename = name;
    }
    if let Some(dir) = args.token_dir {
        config = config.with_token_dir(dir);
    }

    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match CredentialInstaller::from_config(&config).install(args.path.as_deref()) {
        Ok(_) => {
            println!("OK");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
