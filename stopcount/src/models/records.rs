//! Count records: per batch, per date and the durable multi-date record

use super::station::Location;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Stop id (parent or child) → stop times counted, for one date and one batch
///
/// Written once per batch and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountRecord {
    counts: BTreeMap<String, u64>,
}

impl CountRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stop_id: impl Into<String>, count: u64) {
        self.counts.insert(stop_id.into(), count);
    }

    pub fn get(&self, stop_id: &str) -> Option<u64> {
        self.counts.get(stop_id).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.counts.iter()
    }

    /// Sum over every stop in the record
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

impl FromIterator<(String, u64)> for CountRecord {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

/// A persisted count record with the batch it came from (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCounts {
    pub batch: usize,
    pub record: CountRecord,
}

/// Parent station id → stop times for one date, children folded in
pub type ParentTotals = BTreeMap<String, u64>;

/// Durable per-station entry: identity plus one count per recorded date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStation {
    pub name: String,
    pub location: Option<Location>,
    /// `YYYY-MM-DD` → stop times; older files call this field `count`
    #[serde(alias = "count", default)]
    pub counts: BTreeMap<String, u64>,
}

/// Parent station id → durable entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalRecord {
    stations: BTreeMap<String, FinalStation>,
}

impl FinalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, parent_id: &str) -> Option<&FinalStation> {
        self.stations.get(parent_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FinalStation)> {
        self.stations.iter()
    }

    /// Entry for `parent_id`, created from `make` on first encounter
    pub fn entry_or_insert_with<F>(&mut self, parent_id: &str, make: F) -> &mut FinalStation
    where
        F: FnOnce() -> FinalStation,
    {
        self.stations.entry(parent_id.to_string()).or_insert_with(make)
    }

    /// Every date recorded for at least one station, ascending
    pub fn recorded_dates(&self) -> BTreeSet<String> {
        self.stations
            .values()
            .flat_map(|s| s.counts.keys().cloned())
            .collect()
    }
}
