//! Status and projects commands

use anyhow::Result;
use console::style;

use super::output::print_json;
use churnwatch::mining::IngestService;
use churnwatch::models::RunResult;

/// Run the status command
pub fn run(service: &IngestService, project: &str, json: bool) -> Result<()> {
    let status = service.status(project)?;
    if json {
        return print_json(&status);
    }

    println!("\n  Project: {}", style(&status.project).cyan());
    match &status.last_commit_hash {
        Some(hash) => println!(
            "  {} Analyzed up to {}",
            style("[OK]").green(),
            style(hash.short()).dim()
        ),
        None => println!(
            "  {} Not analyzed yet. Run {}",
            style("[--]").dim(),
            style(format!("churnwatch ingest {} <location>", status.project)).cyan()
        ),
    }
    println!(
        "      {} changes across {} files",
        style(status.change_count).cyan(),
        style(status.file_count).cyan()
    );
    if status.job_running {
        println!("  {} Ingestion in progress", style("[..]").yellow());
    }
    if let Some(run) = &status.last_run {
        match run.result {
            RunResult::Completed => {}
            RunResult::Cancelled => println!("  {} Last ingestion was cancelled", style("[!!]").yellow()),
            RunResult::Failed => println!(
                "  {} Last ingestion failed: {}",
                style("[!!]").red(),
                run.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!();
    Ok(())
}

/// Run the projects command
pub fn projects(service: &IngestService, json: bool) -> Result<()> {
    let projects = service.projects()?;
    if json {
        return print_json(&projects);
    }

    if projects.is_empty() {
        println!("No projects yet. Run {}", style("churnwatch ingest <name> <location>").cyan());
        return Ok(());
    }
    for project in &projects {
        let checkpoint = project
            .last_analyzed_hash
            .as_ref()
            .map(|h| h.short().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<24} {:<14} {}",
            style(&project.name).bold(),
            style(checkpoint).dim(),
            project.repo_path
        );
    }
    Ok(())
}
