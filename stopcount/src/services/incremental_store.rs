//! Durable multi-date record
//!
//! The final record is the system's long-lived state: one entry per parent
//! station with a count per recorded date. Publishing a date loads the whole
//! record, upserts that date for every parent and rewrites the file
//! atomically. Other dates are never touched.
//!
//! A record that exists but does not parse aborts publishing. Starting over
//! from an empty record would silently drop every earlier date.

use crate::error::{DownloaderError, DownloaderResult};
use crate::models::{FinalRecord, FinalStation, Hierarchy, ParentTotals};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stopcount_common::fs::write_json_atomic;
use stopcount_common::time::format_date;
use tracing::{debug, info};

/// File-backed [`FinalRecord`]
#[derive(Debug, Clone)]
pub struct IncrementalStore {
    path: PathBuf,
}

impl IncrementalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; a missing file is an empty record
    pub fn load(&self) -> DownloaderResult<FinalRecord> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No final record yet, starting empty");
                return Ok(FinalRecord::new());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content).map_err(|e| DownloaderError::StoreCorruption {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Atomically replace the record on disk
    pub fn save(&self, record: &FinalRecord) -> DownloaderResult<()> {
        write_json_atomic(&self.path, record)?;
        Ok(())
    }

    /// Load, merge one date, save
    pub fn publish(
        &self,
        hierarchy: &Hierarchy,
        totals: &ParentTotals,
        date: NaiveDate,
    ) -> DownloaderResult<FinalRecord> {
        let mut record = self.load()?;
        merge(&mut record, hierarchy, totals, date);
        self.save(&record)?;

        info!(
            path = %self.path.display(),
            date = %format_date(date),
            stations = record.len(),
            "Final record published"
        );
        Ok(record)
    }
}

/// Upsert `date` for every parent of the hierarchy
///
/// New parents get their name and location from the hierarchy. Parents
/// without a total are set to 0. Entries for parents no longer in the
/// hierarchy are kept as they are.
pub fn merge(record: &mut FinalRecord, hierarchy: &Hierarchy, totals: &ParentTotals, date: NaiveDate) {
    let date_key = format_date(date);
    let mut created = 0usize;

    for (parent_id, station) in hierarchy.iter() {
        let entry = record.entry_or_insert_with(parent_id, || {
            created += 1;
            FinalStation {
                name: station.name.clone(),
                location: station.location,
                counts: BTreeMap::new(),
            }
        });
        let total = totals.get(parent_id).copied().unwrap_or(0);
        entry.counts.insert(date_key.clone(), total);
    }

    debug!(date = %date_key, created, "Merged date into final record");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, Station};
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn hierarchy() -> Hierarchy {
        let mut stations = BTreeMap::new();
        stations.insert(
            "P1".to_string(),
            Station::new("Náměstí Míru", Some(Location { lat: 50.07, lon: 14.43 })),
        );
        stations.insert("P2".to_string(), Station::new("Muzeum", None));
        Hierarchy::new(stations)
    }

    fn totals(pairs: &[(&str, u64)]) -> ParentTotals {
        pairs.iter().map(|(id, n)| (id.to_string(), *n)).collect()
    }

    #[test]
    fn test_merge_creates_entries_and_defaults_to_zero() {
        let mut record = FinalRecord::new();

        merge(&mut record, &hierarchy(), &totals(&[("P1", 10)]), date("2020-01-02"));

        let p1 = record.get("P1").unwrap();
        assert_eq!(p1.name, "Náměstí Míru");
        assert_eq!(p1.location, Some(Location { lat: 50.07, lon: 14.43 }));
        assert_eq!(p1.counts["2020-01-02"], 10);
        assert_eq!(record.get("P2").unwrap().counts["2020-01-02"], 0);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let hierarchy = hierarchy();
        let totals = totals(&[("P1", 10), ("P2", 4)]);

        let mut once = FinalRecord::new();
        merge(&mut once, &hierarchy, &totals, date("2020-01-02"));
        let mut twice = once.clone();
        merge(&mut twice, &hierarchy, &totals, date("2020-01-02"));

        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_preserves_other_dates() {
        let hierarchy = hierarchy();
        let mut record = FinalRecord::new();

        merge(&mut record, &hierarchy, &totals(&[("P1", 10)]), date("2019-12-07"));
        merge(&mut record, &hierarchy, &totals(&[("P1", 3)]), date("2020-01-02"));

        let p1 = record.get("P1").unwrap();
        assert_eq!(p1.counts["2019-12-07"], 10);
        assert_eq!(p1.counts["2020-01-02"], 3);
    }

    #[test]
    fn test_rerun_overwrites_only_that_date() {
        let hierarchy = hierarchy();
        let mut record = FinalRecord::new();

        merge(&mut record, &hierarchy, &totals(&[("P1", 10)]), date("2019-12-07"));
        merge(&mut record, &hierarchy, &totals(&[("P1", 3)]), date("2020-01-02"));
        merge(&mut record, &hierarchy, &totals(&[("P1", 5)]), date("2020-01-02"));

        let p1 = record.get("P1").unwrap();
        assert_eq!(p1.counts["2019-12-07"], 10);
        assert_eq!(p1.counts["2020-01-02"], 5);
    }

    #[test]
    fn test_existing_identity_is_not_overwritten() {
        let mut record = FinalRecord::new();
        record.entry_or_insert_with("P1", || FinalStation {
            name: "Old name".to_string(),
            location: None,
            counts: BTreeMap::new(),
        });

        merge(&mut record, &hierarchy(), &totals(&[]), date("2020-01-02"));

        assert_eq!(record.get("P1").unwrap().name, "Old name");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(dir.path().join("final.json"));

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_publish_roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(dir.path().join("final.json"));

        store
            .publish(&hierarchy(), &totals(&[("P1", 10)]), date("2019-12-07"))
            .unwrap();
        let record = store
            .publish(&hierarchy(), &totals(&[("P2", 2)]), date("2020-01-02"))
            .unwrap();

        assert_eq!(store.load().unwrap(), record);
        assert_eq!(record.get("P1").unwrap().counts["2019-12-07"], 10);
        assert_eq!(record.get("P2").unwrap().counts["2020-01-02"], 2);
    }

    #[test]
    fn test_corrupt_record_aborts_publish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("final.json");
        std::fs::write(&path, b"{\"P1\": {\"name\": ").unwrap();
        let store = IncrementalStore::new(&path);

        let err = store
            .publish(&hierarchy(), &totals(&[("P1", 1)]), date("2020-01-02"))
            .unwrap_err();

        assert!(matches!(err, DownloaderError::StoreCorruption { .. }));
        // Corrupt file left untouched for inspection
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"P1\": {\"name\": ");
    }
}
