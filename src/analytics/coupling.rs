//! Temporal coupling: files that change together
//!
//! For every pair of files that appear in the same commit, the score is
//! `shared / min(total_a, total_b)`: 1.0 means the less active file never
//! changes without the other.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::models::{Change, Commit, CommitId, FilePath, ProjectId, TemporalCoupling};
use crate::store::{ChangeStore, StoreResult};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 200;
pub const DEFAULT_MIN_SHARED_COMMITS: u64 = 2;

/// Inclusive commit-timestamp window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.since.map_or(true, |s| *ts >= s) && self.until.map_or(true, |u| *ts <= u)
    }
}

/// Parameters for a coupling query.
///
/// Numeric fields are signed so out-of-range caller input can be mapped to
/// defaults instead of rejected.
#[derive(Debug, Clone, Default)]
pub struct CouplingQuery {
    pub limit: Option<i64>,
    pub date_range: Option<DateRange>,
    pub min_shared_commits: Option<i64>,
    pub min_coupling_score: f64,
    /// Extension allow-list (`"rs"` or `".rs"`); empty allows everything
    pub file_types: Vec<String>,
    /// Opt-in cap: commits touching more files than this are left out of
    /// pair counting. `None` and `Some(0)` count every commit.
    pub max_files_per_commit: Option<usize>,
}

impl CouplingQuery {
    /// Limit clamped to `[1, MAX_LIMIT]`; unset or non-positive falls back to
    /// `DEFAULT_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(n) if n > 0 => (n as u64).min(MAX_LIMIT as u64) as usize,
            _ => DEFAULT_LIMIT,
        }
    }

    pub fn effective_min_shared(&self) -> u64 {
        match self.min_shared_commits {
            Some(n) if n >= 1 => n as u64,
            _ => DEFAULT_MIN_SHARED_COMMITS,
        }
    }

    pub fn effective_min_score(&self) -> f64 {
        if self.min_coupling_score.is_finite() && self.min_coupling_score > 0.0 {
            self.min_coupling_score
        } else {
            0.0
        }
    }

    fn effective_max_files(&self) -> Option<usize> {
        self.max_files_per_commit.filter(|&n| n > 0)
    }

    fn extension_filter(&self) -> Option<FxHashSet<String>> {
        let allowed: FxHashSet<String> = self
            .file_types
            .iter()
            .map(|t| t.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        (!allowed.is_empty()).then_some(allowed)
    }
}

/// Files of one commit after filtering, deduplicated and sorted.
struct CommitFiles<'a> {
    timestamp: DateTime<Utc>,
    files: Vec<&'a FilePath>,
}

type PairCounts<'a> = FxHashMap<(&'a FilePath, &'a FilePath), (u64, DateTime<Utc>)>;

fn merge_pairs<'a>(mut into: PairCounts<'a>, from: PairCounts<'a>) -> PairCounts<'a> {
    for (pair, (shared, last)) in from {
        let entry = into.entry(pair).or_insert((0, last));
        entry.0 += shared;
        if last > entry.1 {
            entry.1 = last;
        }
    }
    into
}

/// Compute coupling rows from raw commits and changes.
pub fn compute(commits: &[Commit], changes: &[Change], query: &CouplingQuery) -> Vec<TemporalCoupling> {
    let window = query.date_range.unwrap_or_default();
    let extensions = query.extension_filter();

    let timestamps: FxHashMap<CommitId, DateTime<Utc>> = commits
        .iter()
        .filter(|c| window.contains(&c.timestamp))
        .map(|c| (c.id, c.timestamp))
        .collect();

    let mut grouped: FxHashMap<CommitId, CommitFiles<'_>> = FxHashMap::default();
    for change in changes {
        let Some(ts) = timestamps.get(&change.commit_id) else {
            continue;
        };
        if let Some(allowed) = &extensions {
            match change.file_path.extension() {
                Some(ext) if allowed.contains(&ext) => {}
                _ => continue,
            }
        }
        grouped
            .entry(change.commit_id)
            .or_insert_with(|| CommitFiles {
                timestamp: *ts,
                files: Vec::new(),
            })
            .files
            .push(&change.file_path);
    }

    let mut per_commit: Vec<CommitFiles<'_>> = grouped.into_values().collect();
    for commit in &mut per_commit {
        commit.files.sort();
        commit.files.dedup();
    }

    let mut totals: FxHashMap<&FilePath, u64> = FxHashMap::default();
    for commit in &per_commit {
        for file in &commit.files {
            *totals.entry(*file).or_insert(0) += 1;
        }
    }

    let max_files = query.effective_max_files();
    if let Some(cap) = max_files {
        let skipped = per_commit.iter().filter(|c| c.files.len() > cap).count();
        if skipped > 0 {
            debug!(
                "Skipping {} commits touching more than {} files for pair counting",
                skipped, cap
            );
        }
    }

    let pairs: PairCounts<'_> = per_commit
        .par_iter()
        .filter(|c| c.files.len() >= 2 && max_files.map_or(true, |cap| c.files.len() <= cap))
        .fold(FxHashMap::default, |mut acc, commit| {
            // files are sorted, so (files[i], files[j]) with i < j is canonical
            for (i, a) in commit.files.iter().enumerate() {
                for b in &commit.files[i + 1..] {
                    let entry = acc.entry((*a, *b)).or_insert((0, commit.timestamp));
                    entry.0 += 1;
                    if commit.timestamp > entry.1 {
                        entry.1 = commit.timestamp;
                    }
                }
            }
            acc
        })
        .reduce(FxHashMap::default, merge_pairs);

    let min_shared = query.effective_min_shared();
    let min_score = query.effective_min_score();

    let mut rows: Vec<TemporalCoupling> = pairs
        .into_iter()
        .filter_map(|((a, b), (shared, last_modified))| {
            if shared < min_shared {
                return None;
            }
            let total_a = totals.get(a).copied().unwrap_or(0);
            let total_b = totals.get(b).copied().unwrap_or(0);
            let denominator = total_a.min(total_b);
            if denominator == 0 {
                return None;
            }
            let score = shared as f64 / denominator as f64;
            if score < min_score {
                return None;
            }
            Some(TemporalCoupling {
                file_a: a.clone(),
                file_b: b.clone(),
                shared_commits: shared,
                total_commits_a: total_a,
                total_commits_b: total_b,
                coupling_score: score,
                last_modified,
            })
        })
        .collect();

    rows.sort_by(|x, y| {
        y.coupling_score
            .total_cmp(&x.coupling_score)
            .then_with(|| y.shared_commits.cmp(&x.shared_commits))
            .then_with(|| x.file_a.cmp(&y.file_a))
            .then_with(|| x.file_b.cmp(&y.file_b))
    });
    rows.truncate(query.effective_limit());
    rows
}

/// Scores co-change between pairs of files. Read-only.
#[derive(Clone)]
pub struct TemporalCouplingAnalyzer {
    store: Arc<dyn ChangeStore>,
}

impl TemporalCouplingAnalyzer {
    pub fn new(store: Arc<dyn ChangeStore>) -> Self {
        Self { store }
    }

    pub fn couple(
        &self,
        project_id: ProjectId,
        query: &CouplingQuery,
    ) -> StoreResult<Vec<TemporalCoupling>> {
        let commits = self.store.commits_for_project(project_id)?;
        let changes = self.store.changes_for_project(project_id)?;
        Ok(compute(&commits, &changes, query))
    }
}
