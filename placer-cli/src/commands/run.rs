//! End-to-end run handler

use colored::*;
use placer_workflow::{
    JobSource, PlacementWorkflow, TokenSource, WorkflowError, WorkflowRequest,
};
use std::path::PathBuf;

use super::placement::{print_outcome, print_placement, print_retrieval};

/// Arguments of `placer run`
pub struct RunArgs {
    pub file: PathBuf,
    pub token: Option<PathBuf>,
    pub installed_token: bool,
    pub minutes: f64,
    pub spool: bool,
}

/// Install, submit, monitor and retrieve
pub async fn run(workflow: &PlacementWorkflow, args: RunArgs) -> Result<(), WorkflowError> {
    let token = match (args.token, args.installed_token) {
        (Some(path), _) => TokenSource::Path(path),
        (None, true) => TokenSource::Installed,
        (None, false) => TokenSource::Discover,
    };

    let request = WorkflowRequest::new(JobSource::File(args.file))
        .with_token(token)
        .with_spool(args.spool)
        .with_monitor_minutes(args.minutes);

    let report = workflow.run(request).await?;

    if let Some(path) = &report.installed_token {
        println!(
            "{} Token installed at {}",
            "✓".green(),
            path.display().to_string().cyan()
        );
    }
    print_placement(&report.placement);
    print_outcome(&report.outcome);
    match &report.retrieval {
        Some(retrieval) => print_retrieval(retrieval, workflow),
        None if !report.placement.spool() => println!(
            "{}",
            "Outputs were written directly to the shared filesystem.".dimmed()
        ),
        None => {}
    }
    Ok(())
}
