//! churnwatch - mine git history for change hotspots and temporal coupling
//!
//! Walks a repository's commits, records which files each commit touched and
//! by how many lines, and answers questions over the accumulated history:
//! which files change most often, which files change together, and who
//! changes them.
//!
//! ```no_run
//! use std::sync::Arc;
//! use churnwatch::git::GitHistorySource;
//! use churnwatch::mining::IngestService;
//! use churnwatch::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let history = Arc::new(GitHistorySource::new("/tmp/churnwatch-clones"));
//! let service = IngestService::new(store.clone(), store, history);
//!
//! let outcome = service.start_full("api", "/path/to/repo").unwrap().join().unwrap();
//! println!("{} commits ingested", outcome.stats.commit_count);
//! for hotspot in service.hotspots("api", 10).unwrap() {
//!     println!("{} {}", hotspot.change_count, hotspot.file_path);
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod git;
pub mod jobs;
pub mod mining;
pub mod models;
pub mod store;
