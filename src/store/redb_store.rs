//! On-disk store using redb
//!
//! Records are JSON-encoded values in redb tables. Commits and changes are
//! keyed by `(project_id, id)` so a project's rows are one range scan.
//! `record_commit` writes the commit, its changes and the id counters in a
//! single write transaction.

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ChangeStore, ProjectStore, StoreError, StoreResult};
use crate::models::{
    Change, Commit, CommitId, GitHash, NewChange, NewCommit, NewProject, Project, ProjectId,
};

// redb table definitions
const PROJECTS: TableDefinition<u64, &[u8]> = TableDefinition::new("projects");
const PROJECT_NAMES: TableDefinition<&str, u64> = TableDefinition::new("project_names");
const COMMITS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("commits");
/// `"{project_id}:{hash}"` -> commit id
const COMMIT_HASHES: TableDefinition<&str, u64> = TableDefinition::new("commit_hashes");
/// commit id -> project id
const COMMIT_OWNERS: TableDefinition<u64, u64> = TableDefinition::new("commit_owners");
const CHANGES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("changes");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const PROJECT_SEQ: &str = "project";
const COMMIT_SEQ: &str = "commit";
const CHANGE_SEQ: &str = "change";

macro_rules! backend_error {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Backend(redb::Error::from(e))
                }
            }
        )*
    };
}

backend_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);

fn commit_key(project_id: ProjectId, hash: &GitHash) -> String {
    format!("{}:{}", project_id, hash)
}

fn next_id(counters: &mut redb::Table<'_, &'static str, u64>, seq: &str) -> StoreResult<u64> {
    let current = counters.get(seq)?.map(|g| g.value()).unwrap_or(0);
    let next = current + 1;
    counters.insert(seq, next)?;
    Ok(next)
}

/// Persistent [`ChangeStore`] + [`ProjectStore`]
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// Create or open a store in `data_dir` (file `churnwatch.redb`)
    pub fn new(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        Self::open(&data_dir.join("churnwatch.redb"))
    }

    /// Create or open a store at an exact file path
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path)?;

        // Create every table up front so read transactions never see a
        // missing table.
        let txn = db.begin_write()?;
        {
            txn.open_table(PROJECTS)?;
            txn.open_table(PROJECT_NAMES)?;
            txn.open_table(COMMITS)?;
            txn.open_table(COMMIT_HASHES)?;
            txn.open_table(COMMIT_OWNERS)?;
            txn.open_table(CHANGES)?;
            txn.open_table(COUNTERS)?;
        }
        txn.commit()?;

        debug!("Opened store at {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn insert_commit(txn: &redb::WriteTransaction, commit: NewCommit) -> StoreResult<Commit> {
        let key = commit_key(commit.project_id, &commit.hash);
        let mut hashes = txn.open_table(COMMIT_HASHES)?;
        if hashes.get(key.as_str())?.is_some() {
            return Err(StoreError::DuplicateCommit {
                project_id: commit.project_id,
                hash: commit.hash,
            });
        }

        let mut counters = txn.open_table(COUNTERS)?;
        let id = next_id(&mut counters, COMMIT_SEQ)?;
        let stored = Commit {
            id,
            project_id: commit.project_id,
            hash: commit.hash,
            author: commit.author,
            timestamp: commit.timestamp,
            message: commit.message,
            created_at: Utc::now(),
        };

        let encoded = serde_json::to_vec(&stored)?;
        txn.open_table(COMMITS)?
            .insert((stored.project_id, id), encoded.as_slice())?;
        txn.open_table(COMMIT_OWNERS)?
            .insert(id, stored.project_id)?;
        hashes.insert(key.as_str(), id)?;
        Ok(stored)
    }

    fn insert_changes(
        txn: &redb::WriteTransaction,
        commit_id: CommitId,
        changes: &[NewChange],
    ) -> StoreResult<Vec<Change>> {
        let project_id = txn
            .open_table(COMMIT_OWNERS)?
            .get(commit_id)?
            .map(|g| g.value())
            .ok_or(StoreError::CommitNotFound(commit_id))?;

        let mut counters = txn.open_table(COUNTERS)?;
        let mut table = txn.open_table(CHANGES)?;
        let mut stored = Vec::with_capacity(changes.len());
        for change in changes {
            let id = next_id(&mut counters, CHANGE_SEQ)?;
            let row = Change {
                id,
                commit_id,
                file_path: change.file_path.clone(),
                lines_added: change.lines_added,
                lines_deleted: change.lines_deleted,
            };
            let encoded = serde_json::to_vec(&row)?;
            table.insert((project_id, id), encoded.as_slice())?;
            stored.push(row);
        }
        Ok(stored)
    }

    fn scan_project<T: serde::de::DeserializeOwned>(
        &self,
        definition: TableDefinition<'_, (u64, u64), &'static [u8]>,
        project_id: ProjectId,
    ) -> StoreResult<Vec<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(definition)?;
        let mut rows = Vec::new();
        for entry in table.range((project_id, 0u64)..=(project_id, u64::MAX))? {
            let (_, value) = entry?;
            rows.push(serde_json::from_slice(value.value())?);
        }
        Ok(rows)
    }
}

impl ProjectStore for RedbStore {
    fn get_by_name(&self, name: &str) -> StoreResult<Option<Project>> {
        let id = {
            let txn = self.db.begin_read()?;
            let names = txn.open_table(PROJECT_NAMES)?;
            let id = names.get(name)?.map(|g| g.value());
            id
        };
        match id {
            Some(id) => self.get_by_id(id),
            None => Ok(None),
        }
    }

    fn get_by_id(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PROJECTS)?;
        let project = match table.get(id)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(project)
    }

    fn create(&self, project: NewProject) -> StoreResult<Project> {
        let txn = self.db.begin_write()?;
        let stored = {
            let mut names = txn.open_table(PROJECT_NAMES)?;
            if names.get(project.name.as_str())?.is_some() {
                return Err(StoreError::DuplicateProject(project.name));
            }
            let mut counters = txn.open_table(COUNTERS)?;
            let id = next_id(&mut counters, PROJECT_SEQ)?;
            let stored = Project {
                id,
                name: project.name,
                repo_path: project.repo_path,
                last_analyzed_hash: None,
                created_at: Utc::now(),
            };
            let encoded = serde_json::to_vec(&stored)?;
            txn.open_table(PROJECTS)?.insert(id, encoded.as_slice())?;
            names.insert(stored.name.as_str(), id)?;
            stored
        };
        txn.commit()?;
        Ok(stored)
    }

    fn update(&self, project: &Project) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PROJECTS)?;
            let previous: Project = match table.get(project.id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StoreError::ProjectNotFound(project.id)),
            };
            let encoded = serde_json::to_vec(project)?;
            table.insert(project.id, encoded.as_slice())?;

            if previous.name != project.name {
                let mut names = txn.open_table(PROJECT_NAMES)?;
                names.remove(previous.name.as_str())?;
                names.insert(project.name.as_str(), project.id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<Project>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PROJECTS)?;
        let mut projects = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            projects.push(serde_json::from_slice(value.value())?);
        }
        Ok(projects)
    }
}

impl ChangeStore for RedbStore {
    fn create_commit(&self, commit: NewCommit) -> StoreResult<Commit> {
        let txn = self.db.begin_write()?;
        let stored = Self::insert_commit(&txn, commit)?;
        txn.commit()?;
        Ok(stored)
    }

    fn create_changes_batch(
        &self,
        commit_id: CommitId,
        changes: &[NewChange],
    ) -> StoreResult<Vec<Change>> {
        let txn = self.db.begin_write()?;
        let stored = Self::insert_changes(&txn, commit_id, changes)?;
        txn.commit()?;
        Ok(stored)
    }

    fn record_commit(
        &self,
        commit: NewCommit,
        changes: &[NewChange],
    ) -> StoreResult<(Commit, Vec<Change>)> {
        let txn = self.db.begin_write()?;
        let stored = Self::insert_commit(&txn, commit)?;
        let changes = Self::insert_changes(&txn, stored.id, changes)?;
        txn.commit()?;
        Ok((stored, changes))
    }

    fn has_commit(&self, project_id: ProjectId, hash: &GitHash) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(COMMIT_HASHES)?;
        let key = commit_key(project_id, hash);
        let found = table.get(key.as_str())?.is_some();
        Ok(found)
    }

    fn commits_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Commit>> {
        self.scan_project(COMMITS, project_id)
    }

    fn changes_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Change>> {
        self.scan_project(CHANGES, project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilePath;
    use tempfile::tempdir;

    fn new_commit(project_id: ProjectId, n: u8) -> NewCommit {
        NewCommit {
            project_id,
            hash: GitHash::parse(&format!("{:040x}", n)).unwrap(),
            author: "dev".into(),
            timestamp: Utc::now(),
            message: format!("commit {n}"),
        }
    }

    fn change(path: &str) -> NewChange {
        NewChange {
            file_path: FilePath::new(path).unwrap(),
            lines_added: 4,
            lines_deleted: 1,
        }
    }

    #[test]
    fn test_projects_roundtrip_and_update() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path()).unwrap();
        let mut project = store
            .create(NewProject {
                name: "app".into(),
                repo_path: "/srv/app".into(),
            })
            .unwrap();
        assert!(matches!(
            store.create(NewProject {
                name: "app".into(),
                repo_path: String::new()
            }),
            Err(StoreError::DuplicateProject(_))
        ));

        project.last_analyzed_hash =
            Some(GitHash::parse("0123456789abcdef0123456789abcdef01234567").unwrap());
        store.update(&project).unwrap();
        assert_eq!(store.get_by_name("app").unwrap(), Some(project.clone()));
        assert_eq!(store.list().unwrap(), vec![project]);
    }

    #[test]
    fn test_commits_and_changes_are_scoped_per_project() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path()).unwrap();
        store
            .record_commit(new_commit(1, 1), &[change("a.rs"), change("b.rs")])
            .unwrap();
        store.record_commit(new_commit(2, 1), &[change("c.rs")]).unwrap();

        assert_eq!(store.changes_for_project(1).unwrap().len(), 2);
        assert_eq!(store.changes_for_project(2).unwrap().len(), 1);
        assert_eq!(store.commits_for_project(1).unwrap().len(), 1);
        assert_eq!(store.count_files(1).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_commit_is_rolled_back() {
        let dir = tempdir().unwrap();
        let store = RedbStore::new(dir.path()).unwrap();
        store.record_commit(new_commit(1, 1), &[change("a.rs")]).unwrap();
        assert!(matches!(
            store.record_commit(new_commit(1, 1), &[change("b.rs")]),
            Err(StoreError::DuplicateCommit { .. })
        ));
        assert_eq!(store.count_changes(1).unwrap(), 1);
        assert!(matches!(
            store.create_changes_batch(77, &[change("z.rs")]),
            Err(StoreError::CommitNotFound(77))
        ));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let hash = {
            let store = RedbStore::new(dir.path()).unwrap();
            let (commit, _) = store.record_commit(new_commit(1, 9), &[change("a.rs")]).unwrap();
            commit.hash
        };
        let store = RedbStore::new(dir.path()).unwrap();
        assert!(store.has_commit(1, &hash).unwrap());
        assert_eq!(store.changes_for_project(1).unwrap()[0].file_path.as_str(), "a.rs");
    }
}
