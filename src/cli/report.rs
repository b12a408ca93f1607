//! Hotspot, coupling and ownership reports

use anyhow::Result;
use console::style;

use super::output::{fit, print_json};
use churnwatch::analytics::CouplingQuery;
use churnwatch::mining::IngestService;

const PATH_WIDTH: usize = 48;

pub fn hotspots(service: &IngestService, project: &str, limit: usize, json: bool) -> Result<()> {
    let rows = service.hotspots(project, limit)?;
    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No changes recorded for {}", style(project).cyan());
        return Ok(());
    }

    println!(
        "\n  {}  {:>8}  {:>8}  {:>8}",
        style(fit("FILE", PATH_WIDTH)).bold(),
        style("COMMITS").bold(),
        style("+LINES").bold(),
        style("-LINES").bold()
    );
    for row in &rows {
        println!(
            "  {}  {:>8}  {:>8}  {:>8}",
            fit(row.file_path.as_str(), PATH_WIDTH),
            style(row.change_count).cyan(),
            style(row.total_added).green(),
            style(row.total_deleted).red()
        );
    }
    println!();
    Ok(())
}

pub fn coupling(service: &IngestService, project: &str, query: &CouplingQuery, json: bool) -> Result<()> {
    let pairs = service.coupling(project, query)?;
    if json {
        return print_json(&pairs);
    }
    if pairs.is_empty() {
        println!(
            "No file pairs share at least {} commits in {}",
            query.effective_min_shared(),
            style(project).cyan()
        );
        return Ok(());
    }

    println!();
    for pair in &pairs {
        let score = format!("{:>5.2}", pair.coupling_score);
        let score = if pair.coupling_score >= 0.75 {
            style(score).red()
        } else if pair.coupling_score >= 0.5 {
            style(score).yellow()
        } else {
            style(score).dim()
        };
        println!(
            "  {}  {} <-> {}",
            score,
            style(pair.file_a.as_str()).bold(),
            style(pair.file_b.as_str()).bold()
        );
        println!(
            "         {} shared of {}/{} commits, last {}",
            pair.shared_commits,
            pair.total_commits_a,
            pair.total_commits_b,
            style(pair.last_modified.format("%Y-%m-%d")).dim()
        );
    }
    println!();
    Ok(())
}

pub fn authors(service: &IngestService, project: &str, limit: usize, json: bool) -> Result<()> {
    let rows = service.author_breakdown(project, limit)?;
    if json {
        return print_json(&rows);
    }

    println!();
    for row in &rows {
        println!(
            "  {:<32} {:>6} commits  {:>6} files  {} {}",
            style(&row.author).bold(),
            style(row.commit_count).cyan(),
            row.files_touched,
            style(format!("+{}", row.lines_added)).green(),
            style(format!("-{}", row.lines_deleted)).red()
        );
    }
    println!();
    Ok(())
}

pub fn file_owners(service: &IngestService, project: &str, limit: usize, json: bool) -> Result<()> {
    let rows = service.file_ownership(project, limit)?;
    if json {
        return print_json(&rows);
    }

    println!();
    for row in &rows {
        let authors = if row.author_count == 1 {
            style(format!("{} author", row.author_count)).yellow()
        } else {
            style(format!("{} authors", row.author_count)).dim()
        };
        println!(
            "  {}  {:>10}  {:>4} commits  {} ({:.0}%)",
            fit(row.file_path.as_str(), PATH_WIDTH),
            authors,
            row.change_count,
            row.top_author,
            row.top_author_share * 100.0
        );
    }
    println!();
    Ok(())
}
