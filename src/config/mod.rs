//! Configuration for churnwatch
//!
//! This module handles:
//! - Settings files (`churnwatch.toml`, `~/.config/churnwatch/config.toml`)
//! - Environment overrides (`CHURNWATCH_*`)
//! - Default data and scratch directories

pub mod paths;
mod settings;

pub use settings::{
    load_settings, CouplingSettings, HotspotSettings, Settings, DEFAULT_HOTSPOT_LIMIT,
    PROJECT_CONFIG_FILE,
};
