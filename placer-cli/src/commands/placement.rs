//! Placement command handlers
//!
//! Each command works on one placement. Submission records the placement so
//! that later invocations can reopen it by cluster id.

use colored::*;
use placer_core::domain::status::JobStatus;
use placer_workflow::{
    JobSource, MonitorOutcome, Placement, PlacementWorkflow, RetrieveReport, WorkflowError,
};
use std::path::PathBuf;
use tracing::warn;

/// Submit a description file
pub async fn submit(
    workflow: &PlacementWorkflow,
    file: PathBuf,
    spool: bool,
) -> Result<(), WorkflowError> {
    let description = workflow.load_description(&JobSource::File(file))?;
    let connection = workflow.connect().await?;
    let placement = workflow.submit(&connection, &description, spool).await?;

    println!("{} {}", "✓".green(), placement.job_ids_label().bold());
    match workflow.save(&placement) {
        Ok(path) => println!("  Record:   {}", path.display().to_string().dimmed()),
        Err(e) => warn!("Placement {} was not recorded: {}", placement.cluster(), e),
    }
    Ok(())
}

/// Refresh and show the status of a placement
pub async fn status(workflow: &PlacementWorkflow, cluster: u64) -> Result<(), WorkflowError> {
    let mut placement = workflow.reopen(cluster).await?;
    if let Err(e) = placement.refresh(true).await {
        println!("{} {}", "⚠ Could not update status:".yellow(), e);
    }

    print_placement(&placement);
    save(workflow, &placement);
    Ok(())
}

/// Monitor a placement for up to `minutes`
pub async fn monitor(
    workflow: &PlacementWorkflow,
    cluster: u64,
    minutes: f64,
) -> Result<(), WorkflowError> {
    let mut placement = workflow.reopen(cluster).await?;
    if minutes.is_infinite() {
        println!("{}", "Monitoring jobs".bold());
    } else {
        println!(
            "{}",
            format!("Monitoring jobs for up to {:.2} minutes", minutes).bold()
        );
    }

    let outcome = placement.monitor(minutes).await;
    print_placement(&placement);
    print_outcome(&outcome);
    save(workflow, &placement);
    Ok(())
}

/// Retrieve results of completed units
pub async fn retrieve(workflow: &PlacementWorkflow, cluster: u64) -> Result<(), WorkflowError> {
    let mut placement = workflow.reopen(cluster).await?;
    if let Err(e) = placement.refresh(true).await {
        warn!("Could not update status before retrieving: {}", e);
    }

    let report = workflow.retrieve(&mut placement).await;
    save(workflow, &placement);
    print_retrieval(&report?, workflow);
    Ok(())
}

fn save(workflow: &PlacementWorkflow, placement: &Placement) {
    if let Err(e) = workflow.save(placement) {
        warn!("Placement {} was not recorded: {}", placement.cluster(), e);
    }
}

/// Print the ids and per-status counts of a placement
pub fn print_placement(placement: &Placement) {
    println!("{}", placement.job_ids_label().bold());
    println!(
        "  Access point: {}",
        placement.connection().name().cyan()
    );

    let summary = placement.summary();
    match summary.updated_at() {
        Some(at) => println!("  As of {}:", at.format("%H:%M:%S").to_string().dimmed()),
        None => {
            println!("  {}", "Status unknown".yellow());
            return;
        }
    }
    for status in JobStatus::ALL {
        let count = summary.count(status);
        if count > 0 {
            println!("    {:>4}  {}", count, colorize_status(status));
        }
    }
}

/// Print how monitoring ended
pub fn print_outcome(outcome: &MonitorOutcome) {
    match outcome {
        MonitorOutcome::AllTerminal(_) => {
            println!("{}", "No jobs in progress; done monitoring.".green());
        }
        MonitorOutcome::TimedOut(_) => {
            println!(
                "{}",
                "End time reached; stopped monitoring. Run 'placer monitor' again to keep waiting."
                    .yellow()
            );
        }
    }
}

/// Print what a retrieval wrote
pub fn print_retrieval(report: &RetrieveReport, workflow: &PlacementWorkflow) {
    if report.retrieved.is_empty() {
        println!(
            "{}",
            "Results of all completed jobs were already retrieved.".yellow()
        );
        return;
    }

    println!(
        "{} Retrieved results of {} job(s) into {}",
        "✓".green(),
        report.retrieved.len(),
        workflow.config().results_dir.display().to_string().cyan()
    );
    for file in &report.files {
        println!("  {}", file.display().to_string().dimmed());
    }
    if !report.skipped.is_empty() {
        println!(
            "{}",
            format!("  {} job(s) were retrieved earlier", report.skipped.len()).dimmed()
        );
    }
}

/// Colorize job status for display
fn colorize_status(status: JobStatus) -> ColoredString {
    let label = status.label();
    match status {
        JobStatus::Queued => label.yellow(),
        JobStatus::TransferringInput | JobStatus::TransferringOutput => label.blue(),
        JobStatus::Running => label.cyan(),
        JobStatus::Suspended => label.magenta(),
        JobStatus::Completed => label.green(),
        JobStatus::Held => label.red(),
        JobStatus::Removed => label.dimmed(),
    }
}
