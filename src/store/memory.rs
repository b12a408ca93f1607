//! In-memory store
//!
//! Everything lives behind one `RwLock`, so a commit and its changes become
//! visible to readers atomically.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ChangeStore, ProjectStore, StoreError, StoreResult};
use crate::models::{
    Change, Commit, CommitId, GitHash, NewChange, NewCommit, NewProject, Project, ProjectId,
};

#[derive(Debug, Default)]
struct Inner {
    projects: BTreeMap<ProjectId, Project>,
    commits: BTreeMap<CommitId, Commit>,
    commit_keys: HashSet<(ProjectId, GitHash)>,
    changes: HashMap<ProjectId, Vec<Change>>,
    next_project_id: u64,
    next_commit_id: u64,
    next_change_id: u64,
}

impl Inner {
    fn insert_commit(&mut self, commit: NewCommit) -> StoreResult<Commit> {
        let key = (commit.project_id, commit.hash.clone());
        if self.commit_keys.contains(&key) {
            return Err(StoreError::DuplicateCommit {
                project_id: commit.project_id,
                hash: commit.hash,
            });
        }

        self.next_commit_id += 1;
        let stored = Commit {
            id: self.next_commit_id,
            project_id: commit.project_id,
            hash: commit.hash,
            author: commit.author,
            timestamp: commit.timestamp,
            message: commit.message,
            created_at: Utc::now(),
        };
        self.commit_keys.insert(key);
        self.commits.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn insert_changes(&mut self, commit_id: CommitId, changes: &[NewChange]) -> StoreResult<Vec<Change>> {
        let project_id = self
            .commits
            .get(&commit_id)
            .map(|c| c.project_id)
            .ok_or(StoreError::CommitNotFound(commit_id))?;

        let mut stored = Vec::with_capacity(changes.len());
        for change in changes {
            self.next_change_id += 1;
            stored.push(Change {
                id: self.next_change_id,
                commit_id,
                file_path: change.file_path.clone(),
                lines_added: change.lines_added,
                lines_deleted: change.lines_deleted,
            });
        }
        self.changes
            .entry(project_id)
            .or_default()
            .extend(stored.iter().cloned());
        Ok(stored)
    }
}

/// Process-local [`ChangeStore`] + [`ProjectStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire read lock. Panics if lock is poisoned (unrecoverable).
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .expect("store lock poisoned: a thread panicked while holding this lock")
    }

    /// Acquire write lock. Panics if lock is poisoned (unrecoverable).
    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .expect("store lock poisoned: a thread panicked while holding this lock")
    }
}

impl ProjectStore for MemoryStore {
    fn get_by_name(&self, name: &str) -> StoreResult<Option<Project>> {
        Ok(self.read().projects.values().find(|p| p.name == name).cloned())
    }

    fn get_by_id(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        Ok(self.read().projects.get(&id).cloned())
    }

    fn create(&self, project: NewProject) -> StoreResult<Project> {
        let mut inner = self.write();
        if inner.projects.values().any(|p| p.name == project.name) {
            return Err(StoreError::DuplicateProject(project.name));
        }
        inner.next_project_id += 1;
        let stored = Project {
            id: inner.next_project_id,
            name: project.name,
            repo_path: project.repo_path,
            last_analyzed_hash: None,
            created_at: Utc::now(),
        };
        inner.projects.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn update(&self, project: &Project) -> StoreResult<()> {
        let mut inner = self.write();
        match inner.projects.get_mut(&project.id) {
            Some(existing) => {
                *existing = project.clone();
                Ok(())
            }
            None => Err(StoreError::ProjectNotFound(project.id)),
        }
    }

    fn list(&self) -> StoreResult<Vec<Project>> {
        Ok(self.read().projects.values().cloned().collect())
    }
}

impl ChangeStore for MemoryStore {
    fn create_commit(&self, commit: NewCommit) -> StoreResult<Commit> {
        self.write().insert_commit(commit)
    }

    fn create_changes_batch(
        &self,
        commit_id: CommitId,
        changes: &[NewChange],
    ) -> StoreResult<Vec<Change>> {
        self.write().insert_changes(commit_id, changes)
    }

    fn record_commit(
        &self,
        commit: NewCommit,
        changes: &[NewChange],
    ) -> StoreResult<(Commit, Vec<Change>)> {
        let mut inner = self.write();
        let stored = inner.insert_commit(commit)?;
        let changes = inner.insert_changes(stored.id, changes)?;
        Ok((stored, changes))
    }

    fn has_commit(&self, project_id: ProjectId, hash: &GitHash) -> StoreResult<bool> {
        Ok(self
            .read()
            .commit_keys
            .contains(&(project_id, hash.clone())))
    }

    fn commits_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Commit>> {
        Ok(self
            .read()
            .commits
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    fn changes_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Change>> {
        Ok(self
            .read()
            .changes
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilePath;

    fn new_commit(project_id: ProjectId, n: u8) -> NewCommit {
        NewCommit {
            project_id,
            hash: GitHash::parse(&format!("{:040x}", n)).unwrap(),
            author: "dev".into(),
            timestamp: Utc::now(),
            message: format!("commit {n}"),
        }
    }

    fn change(path: &str, added: u64, deleted: u64) -> NewChange {
        NewChange {
            file_path: FilePath::new(path).unwrap(),
            lines_added: added,
            lines_deleted: deleted,
        }
    }

    #[test]
    fn test_project_create_is_unique_by_name() {
        let store = MemoryStore::new();
        let p = store
            .create(NewProject {
                name: "app".into(),
                repo_path: "/srv/app".into(),
            })
            .unwrap();
        assert_eq!(store.get_by_name("app").unwrap().unwrap().id, p.id);
        assert!(matches!(
            store.create(NewProject {
                name: "app".into(),
                repo_path: "/elsewhere".into()
            }),
            Err(StoreError::DuplicateProject(_))
        ));
    }

    #[test]
    fn test_update_missing_project() {
        let store = MemoryStore::new();
        let ghost = Project {
            id: 42,
            name: "ghost".into(),
            repo_path: String::new(),
            last_analyzed_hash: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.update(&ghost),
            Err(StoreError::ProjectNotFound(42))
        ));
    }

    #[test]
    fn test_record_commit_and_aggregates() {
        let store = MemoryStore::new();
        let (commit, changes) = store
            .record_commit(new_commit(1, 1), &[change("a.rs", 3, 0), change("b.rs", 1, 1)])
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.commit_id == commit.id));
        store
            .record_commit(new_commit(1, 2), &[change("a.rs", 2, 2)])
            .unwrap();
        store
            .record_commit(new_commit(2, 3), &[change("other.rs", 1, 0)])
            .unwrap();

        assert_eq!(store.count_changes(1).unwrap(), 3);
        assert_eq!(store.count_files(1).unwrap(), 2);
        assert_eq!(store.commits_for_project(1).unwrap().len(), 2);
        assert!(store.has_commit(1, &commit.hash).unwrap());
        assert!(!store.has_commit(2, &commit.hash).unwrap());

        let freq = store.change_frequencies(1, 0).unwrap();
        assert_eq!(freq[0].file_path.as_str(), "a.rs");
        assert_eq!(freq[0].change_count, 2);
    }

    #[test]
    fn test_duplicate_commit_leaves_no_changes() {
        let store = MemoryStore::new();
        store
            .record_commit(new_commit(1, 1), &[change("a.rs", 1, 0)])
            .unwrap();
        assert!(matches!(
            store.record_commit(new_commit(1, 1), &[change("b.rs", 1, 0)]),
            Err(StoreError::DuplicateCommit { .. })
        ));
        assert_eq!(store.count_changes(1).unwrap(), 1);
    }

    #[test]
    fn test_changes_batch_requires_commit() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_changes_batch(99, &[change("a.rs", 1, 0)]),
            Err(StoreError::CommitNotFound(99))
        ));
        let commit = store.create_commit(new_commit(1, 5)).unwrap();
        let stored = store
            .create_changes_batch(commit.id, &[change("a.rs", 1, 0)])
            .unwrap();
        assert_eq!(stored[0].commit_id, commit.id);
    }
}
