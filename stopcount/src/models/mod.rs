//! Data models for stopcount
//!
//! - Raw GTFS stops as served by the remote API
//! - The two-tier station hierarchy
//! - Per-batch counts, per-date totals and the durable multi-date record

pub mod records;
pub mod station;

pub use records::{BatchCounts, CountRecord, FinalRecord, FinalStation, ParentTotals};
pub use station::{Hierarchy, Location, Station, StopFeature, StopProperties};
