//! Layered settings
//!
//! Sources, lowest priority first:
//! 1. `~/.config/churnwatch/config.toml`
//! 2. `churnwatch.toml` in the working directory
//! 3. Environment variables
//!
//! ```toml
//! # churnwatch.toml
//! data_dir = "/var/lib/churnwatch"
//! scratch_dir = "/var/cache/churnwatch/clones"
//!
//! [hotspots]
//! limit = 25
//!
//! [coupling]
//! limit = 50
//! min_shared_commits = 3
//! min_coupling_score = 0.5
//! max_files_per_commit = 80
//! file_types = ["rs", "toml"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::paths;
use crate::analytics::CouplingQuery;

pub const PROJECT_CONFIG_FILE: &str = "churnwatch.toml";
pub const DEFAULT_HOTSPOT_LIMIT: usize = 20;

const ENV_DATA_DIR: &str = "CHURNWATCH_DATA_DIR";
const ENV_SCRATCH_DIR: &str = "CHURNWATCH_SCRATCH_DIR";
const ENV_COUPLING_LIMIT: &str = "CHURNWATCH_COUPLING_LIMIT";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Where `churnwatch.redb` lives
    pub data_dir: Option<PathBuf>,

    /// Where remote repositories are mirrored
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub hotspots: HotspotSettings,

    #[serde(default)]
    pub coupling: CouplingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HotspotSettings {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CouplingSettings {
    pub limit: Option<i64>,
    pub min_shared_commits: Option<i64>,
    pub min_coupling_score: Option<f64>,
    pub max_files_per_commit: Option<usize>,
    pub file_types: Option<Vec<String>>,
}

impl Settings {
    /// Parse one settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Merge another layer into this one (other takes priority)
    pub fn merge(&mut self, other: Settings) {
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.scratch_dir.is_some() {
            self.scratch_dir = other.scratch_dir;
        }
        if other.hotspots.limit.is_some() {
            self.hotspots.limit = other.hotspots.limit;
        }

        let c = other.coupling;
        if c.limit.is_some() {
            self.coupling.limit = c.limit;
        }
        if c.min_shared_commits.is_some() {
            self.coupling.min_shared_commits = c.min_shared_commits;
        }
        if c.min_coupling_score.is_some() {
            self.coupling.min_coupling_score = c.min_coupling_score;
        }
        if c.max_files_per_commit.is_some() {
            self.coupling.max_files_per_commit = c.max_files_per_commit;
        }
        if c.file_types.is_some() {
            self.coupling.file_types = c.file_types;
        }
    }

    /// Apply `CHURNWATCH_*` overrides read through `var`
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var(ENV_SCRATCH_DIR).filter(|v| !v.is_empty()) {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = var(ENV_COUPLING_LIMIT) {
            match raw.trim().parse::<i64>() {
                Ok(limit) => self.coupling.limit = Some(limit),
                Err(_) => warn!("Ignoring {}={:?}: not an integer", ENV_COUPLING_LIMIT, raw),
            }
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(paths::default_data_dir)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(paths::default_scratch_dir)
    }

    pub fn hotspot_limit(&self) -> usize {
        self.hotspots.limit.unwrap_or(DEFAULT_HOTSPOT_LIMIT)
    }

    /// Coupling query seeded from the configured defaults
    pub fn coupling_query(&self) -> CouplingQuery {
        let c = &self.coupling;
        CouplingQuery {
            limit: c.limit,
            date_range: None,
            min_shared_commits: c.min_shared_commits,
            min_coupling_score: c.min_coupling_score.unwrap_or(0.0),
            file_types: c.file_types.clone().unwrap_or_default(),
            max_files_per_commit: c.max_files_per_commit,
        }
    }
}

/// Load settings for a process running in `working_dir`.
///
/// A file that fails to parse is skipped with a warning rather than
/// aborting; environment overrides always apply.
pub fn load_settings(working_dir: &Path) -> Settings {
    let mut settings = Settings::default();

    let layers = [
        paths::user_config_path(),
        Some(working_dir.join(PROJECT_CONFIG_FILE)),
    ];
    for path in layers.into_iter().flatten() {
        if !path.exists() {
            continue;
        }
        match Settings::from_file(&path) {
            Ok(layer) => {
                debug!("Loaded settings from {}", path.display());
                settings.merge(layer);
            }
            Err(e) => warn!("{:#}", e),
        }
    }

    settings.apply_env(|key| std::env::var(key).ok());
    settings
}
