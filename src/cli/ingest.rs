//! Ingest command - mine a repository into a project

use anyhow::{bail, Context, Result};
use console::style;
use indicatif::ProgressBar;
use std::thread;
use tracing::{debug, warn};

use super::output::{print_json, spinner};
use churnwatch::git::{GitHistory, RepoLocation};
use churnwatch::mining::{IngestService, IngestState};

pub fn run(service: &IngestService, project: &str, location: &str, full: bool, json: bool) -> Result<()> {
    if let Ok(RepoLocation::Local(path)) = RepoLocation::parse(location) {
        if !GitHistory::is_git_repo(&path) {
            bail!("{} is not a git repository", path.display());
        }
    }

    let handle = if full {
        service.start_full(project, location)
    } else {
        service.start_incremental(project, location)
    }
    .with_context(|| format!("Failed to start ingestion of {}", project))?;

    let progress = spinner(format!("Ingesting {}...", project));
    if let Err(e) = cancel_on_ctrl_c(service, project, progress.clone()) {
        warn!("Ctrl-C will not cancel cleanly: {:#}", e);
    }
    let result = handle.join();
    progress.finish_and_clear();
    let outcome = result.with_context(|| format!("Ingestion of {} failed", project))?;

    if json {
        return print_json(&outcome);
    }

    let state = match outcome.state {
        IngestState::Completed => style("completed").green(),
        IngestState::CancelledEarly => style("cancelled").yellow(),
    };
    let stats = &outcome.stats;
    println!("\n  Ingested {} ({})", style(&outcome.project).bold(), state);
    println!(
        "    {} commits, {} changes, {} files tracked",
        style(stats.commit_count).cyan(),
        style(stats.change_count).cyan(),
        style(stats.file_count).cyan()
    );
    if stats.skipped_count > 0 {
        println!("    {} already ingested", style(stats.skipped_count).dim());
    }
    if stats.error_count > 0 {
        println!(
            "    {} skipped due to errors (run with --log-level warn for details)",
            style(stats.error_count).red()
        );
    }
    match &outcome.last_commit_hash {
        Some(hash) => println!("    checkpoint {}", style(hash.short()).dim()),
        None => println!("    {}", style("no commits yet").dim()),
    }
    println!();
    Ok(())
}

/// Turn the first Ctrl-C into a cooperative cancel; a second one exits.
///
/// The handler is registered before this returns, so an early Ctrl-C never
/// kills the process mid-commit.
fn cancel_on_ctrl_c(service: &IngestService, project: &str, progress: ProgressBar) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let mut interrupts = {
        let _guard = rt.enter();
        #[cfg(unix)]
        let interrupts = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt());
        #[cfg(windows)]
        let interrupts = tokio::signal::windows::ctrl_c();
        interrupts.context("Failed to install Ctrl-C handler")?
    };
    debug!("Ctrl-C handler installed for {}", project);

    let service = service.clone();
    let project = project.to_string();
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            rt.block_on(async move {
                if interrupts.recv().await.is_none() {
                    return;
                }
                progress.set_message(format!("Cancelling {}...", project));
                match service.request_cancel(&project) {
                    Ok(()) => warn!("Interrupted, stopping ingestion of {} at the next commit", project),
                    Err(e) => debug!("Interrupt ignored: {}", e),
                }
                if interrupts.recv().await.is_some() {
                    progress.finish_and_clear();
                    std::process::exit(130);
                }
            })
        })
        .context("Failed to start Ctrl-C handler")?;
    Ok(())
}
