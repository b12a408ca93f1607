//! Authorship breakdowns
//!
//! Per-author totals and per-file author concentration. A file whose every
//! change comes from one person is under-owned: a bus-factor risk.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::models::{
    AuthorContribution, Change, Commit, CommitId, FileOwnership, FilePath, ProjectId,
};
use crate::store::{ChangeStore, StoreResult};

/// Per-author totals, most active first.
pub fn author_breakdown(commits: &[Commit], changes: &[Change]) -> Vec<AuthorContribution> {
    #[derive(Default)]
    struct Acc<'a> {
        commits: u64,
        files: FxHashSet<&'a FilePath>,
        added: u64,
        deleted: u64,
    }

    let mut authors: FxHashMap<&str, Acc<'_>> = FxHashMap::default();
    let mut commit_author: FxHashMap<CommitId, &str> = FxHashMap::default();
    for commit in commits {
        authors.entry(commit.author.as_str()).or_default().commits += 1;
        commit_author.insert(commit.id, commit.author.as_str());
    }

    for change in changes {
        let Some(author) = commit_author.get(&change.commit_id) else {
            continue;
        };
        let acc = authors.entry(*author).or_default();
        acc.files.insert(&change.file_path);
        acc.added += change.lines_added;
        acc.deleted += change.lines_deleted;
    }

    let mut rows: Vec<AuthorContribution> = authors
        .into_iter()
        .map(|(author, acc)| AuthorContribution {
            author: author.to_string(),
            commit_count: acc.commits,
            files_touched: acc.files.len() as u64,
            lines_added: acc.added,
            lines_deleted: acc.deleted,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.commit_count
            .cmp(&a.commit_count)
            .then_with(|| (b.lines_added + b.lines_deleted).cmp(&(a.lines_added + a.lines_deleted)))
            .then_with(|| a.author.cmp(&b.author))
    });
    rows
}

/// Per-file author concentration, least-owned and most-churned first.
pub fn file_ownership(commits: &[Commit], changes: &[Change]) -> Vec<FileOwnership> {
    let commit_author: FxHashMap<CommitId, &str> = commits
        .iter()
        .map(|c| (c.id, c.author.as_str()))
        .collect();

    // file -> author -> distinct commits
    let mut files: FxHashMap<&FilePath, FxHashMap<&str, FxHashSet<CommitId>>> =
        FxHashMap::default();
    for change in changes {
        let Some(author) = commit_author.get(&change.commit_id) else {
            continue;
        };
        files
            .entry(&change.file_path)
            .or_default()
            .entry(*author)
            .or_default()
            .insert(change.commit_id);
    }

    let mut rows: Vec<FileOwnership> = files
        .into_iter()
        .filter_map(|(path, by_author)| {
            let change_count: u64 = by_author.values().map(|c| c.len() as u64).sum();
            let (top_author, top_commits) = by_author
                .iter()
                .map(|(author, commits)| (*author, commits.len() as u64))
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))?;
            Some(FileOwnership {
                file_path: path.clone(),
                author_count: by_author.len() as u64,
                top_author: top_author.to_string(),
                top_author_share: top_commits as f64 / change_count.max(1) as f64,
                change_count,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.author_count
            .cmp(&b.author_count)
            .then_with(|| b.change_count.cmp(&a.change_count))
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
    rows
}

/// Read-only authorship queries over a [`ChangeStore`]
#[derive(Clone)]
pub struct OwnershipAnalyzer {
    store: Arc<dyn ChangeStore>,
}

impl OwnershipAnalyzer {
    pub fn new(store: Arc<dyn ChangeStore>) -> Self {
        Self { store }
    }

    pub fn author_breakdown(&self, project_id: ProjectId, limit: usize) -> StoreResult<Vec<AuthorContribution>> {
        let commits = self.store.commits_for_project(project_id)?;
        let changes = self.store.changes_for_project(project_id)?;
        let mut rows = author_breakdown(&commits, &changes);
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    pub fn file_ownership(&self, project_id: ProjectId, limit: usize) -> StoreResult<Vec<FileOwnership>> {
        let commits = self.store.commits_for_project(project_id)?;
        let changes = self.store.changes_for_project(project_id)?;
        let mut rows = file_ownership(&commits, &changes);
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
