//! Token command handlers
//!
//! Installs the placement token and reports what is installed.

use clap::Subcommand;
use colored::*;
use placer_workflow::{PlacementWorkflow, TokenState, WorkflowError};
use std::path::PathBuf;

/// Token subcommands
#[derive(Subcommand)]
pub enum TokenCommands {
    /// Install a placement token for this user
    Install {
        /// Token file (default: look in the current and home directories)
        path: Option<PathBuf>,
    },
    /// Show the installed token
    Status,
}

/// Handle token commands
pub fn handle_token_command(
    command: TokenCommands,
    workflow: &PlacementWorkflow,
) -> Result<(), WorkflowError> {
    match command {
        TokenCommands::Install { path } => install(workflow, path),
        TokenCommands::Status => {
            print_token_state(workflow);
            Ok(())
        }
    }
}

fn install(workflow: &PlacementWorkflow, path: Option<PathBuf>) -> Result<(), WorkflowError> {
    let destination = workflow.install_credential(path.as_deref())?;
    println!(
        "{} Token installed at {}",
        "✓".green(),
        destination.display().to_string().cyan()
    );
    Ok(())
}

fn print_token_state(workflow: &PlacementWorkflow) {
    let destination = workflow.installer().destination();
    println!("{}", "Placement Token:".bold());
    println!("  Path:     {}", destination.display().to_string().dimmed());

    match workflow.installer().state() {
        TokenState::Missing => {
            println!("  State:    {}", "not installed".yellow());
            println!(
                "{}",
                "  Install one with 'placer token install [PATH]'".dimmed()
            );
        }
        TokenState::Unreadable(reason) => {
            println!("  State:    {}", "unreadable".red());
            println!("  Reason:   {}", reason);
        }
        TokenState::Unrecognized { reason, mode } => {
            println!("  State:    {}", "not a recognizable token".red());
            println!("  Reason:   {}", reason);
            print_mode(mode);
        }
        TokenState::Expired { expired_at, mode } => {
            println!("  State:    {}", "expired".red());
            println!("  Expired:  {}", expired_at.format("%Y-%m-%d %H:%M:%S"));
            print_mode(mode);
            println!(
                "{}",
                "  Replace it with 'placer token install [PATH]'".dimmed()
            );
        }
        TokenState::Valid {
            expires_at,
            modified,
            len,
            mode,
        } => {
            println!("  State:    {}", "installed".green());
            println!("  Expires:  {}", expires_at.format("%Y-%m-%d %H:%M:%S"));
            println!("  Size:     {} bytes", len);
            print_mode(mode);
            if let Some(modified) = modified {
                println!("  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }
}

fn print_mode(mode: u32) {
    let mode_text = format!("{:o}", mode);
    if mode == 0o600 {
        println!("  Mode:     {}", mode_text);
    } else {
        println!("  Mode:     {} {}", mode_text.red(), "(expected 600)".dimmed());
    }
}
