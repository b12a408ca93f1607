//! Change-frequency hotspots
//!
//! A hotspot is a file that keeps getting touched. Files are ranked by the
//! number of distinct commits that changed them, then by total line churn.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::models::{Change, CommitId, FileChangeFrequency, FilePath, ProjectId};
use crate::store::{ChangeStore, StoreResult};

/// Aggregate changes into one frequency row per file.
///
/// `change_count` counts distinct commits, so a path recorded twice in the
/// same commit still counts once.
pub fn aggregate(changes: &[Change]) -> Vec<FileChangeFrequency> {
    #[derive(Default)]
    struct Acc {
        commits: FxHashSet<CommitId>,
        added: u64,
        deleted: u64,
    }

    let mut by_file: FxHashMap<&FilePath, Acc> = FxHashMap::default();
    for change in changes {
        let acc = by_file.entry(&change.file_path).or_default();
        acc.commits.insert(change.commit_id);
        acc.added += change.lines_added;
        acc.deleted += change.lines_deleted;
    }

    by_file
        .into_iter()
        .map(|(path, acc)| FileChangeFrequency {
            file_path: path.clone(),
            change_count: acc.commits.len() as u64,
            total_added: acc.added,
            total_deleted: acc.deleted,
        })
        .collect()
}

/// Hotspot order: most commits first, then most lines changed, then path.
pub fn compare(a: &FileChangeFrequency, b: &FileChangeFrequency) -> Ordering {
    b.change_count
        .cmp(&a.change_count)
        .then_with(|| b.total_lines().cmp(&a.total_lines()))
        .then_with(|| a.file_path.cmp(&b.file_path))
}

/// Sort into hotspot order and keep the first `limit` rows (`0` keeps all).
pub fn sort_and_truncate(rows: &mut Vec<FileChangeFrequency>, limit: usize) {
    rows.sort_by(compare);
    if limit > 0 {
        rows.truncate(limit);
    }
}

/// Ranks a project's files by change frequency. Read-only.
#[derive(Clone)]
pub struct HotspotAnalyzer {
    store: Arc<dyn ChangeStore>,
}

impl HotspotAnalyzer {
    pub fn new(store: Arc<dyn ChangeStore>) -> Self {
        Self { store }
    }

    pub fn rank(&self, project_id: ProjectId, limit: usize) -> StoreResult<Vec<FileChangeFrequency>> {
        self.store.change_frequencies(project_id, limit)
    }
}
