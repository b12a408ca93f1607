//! Derived metrics over accumulated change records
//!
//! All analyzers are read-only and may run while an ingestion is still
//! writing; they see whatever commits have been persisted so far.

pub mod coupling;
pub mod hotspots;
pub mod ownership;

pub use coupling::{CouplingQuery, DateRange, TemporalCouplingAnalyzer};
pub use hotspots::HotspotAnalyzer;
pub use ownership::OwnershipAnalyzer;
