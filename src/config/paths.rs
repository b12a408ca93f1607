//! Default locations for the database and remote clones
//!
//! Uses `~/.local/share/churnwatch/` for data and `~/.cache/churnwatch/clones/`
//! for remote mirrors on Linux; the platform equivalents elsewhere.

use std::path::{Path, PathBuf};

/// Directory holding `churnwatch.redb`.
pub fn default_data_dir() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".local").join("share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("churnwatch")
}

/// Directory remote repositories are mirrored into, one subdirectory each.
pub fn default_scratch_dir() -> PathBuf {
    let base = dirs::cache_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".cache"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("churnwatch").join("clones")
}

/// User-level config file path
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("churnwatch").join("config.toml"))
}

/// Create `dir` (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}
