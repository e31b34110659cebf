//! Data folder layout
//!
//! Every stage persists its output in the data folder and reads the output
//! of the stage before it from there, so each stage can be re-run on its
//! own. File names:
//!
//! | Stage | File |
//! |---|---|
//! | download-stations | `all_stations.json` |
//! | build-hierarchy | `all_stations_ids.json` |
//! | count | `all_stop_count_{date}_{n}.json`, one per batch |
//! | aggregate | `stop_count_totals_{date}.json` |
//! | publish | `final-stations_with_count.json` |

use crate::error::{DownloaderError, DownloaderResult};
use crate::models::{BatchCounts, CountRecord, Hierarchy, ParentTotals, StopFeature};
use crate::services::incremental_store::IncrementalStore;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use stopcount_common::fs::{read_json, write_json_atomic};
use stopcount_common::time::format_date;
use tracing::debug;

pub const STATIONS_FILE: &str = "all_stations.json";
pub const HIERARCHY_FILE: &str = "all_stations_ids.json";
pub const FINAL_RECORD_FILE: &str = "final-stations_with_count.json";

const COUNT_FILE_PREFIX: &str = "all_stop_count_";
const TOTALS_FILE_PREFIX: &str = "stop_count_totals_";

/// Stage names as used on the command line
pub mod stage {
    pub const DOWNLOAD_STATIONS: &str = "download-stations";
    pub const BUILD_HIERARCHY: &str = "build-hierarchy";
    pub const COUNT: &str = "count";
    pub const AGGREGATE: &str = "aggregate";
}

/// Persisted stage outputs under one root folder
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stations_path(&self) -> PathBuf {
        self.root.join(STATIONS_FILE)
    }

    pub fn hierarchy_path(&self) -> PathBuf {
        self.root.join(HIERARCHY_FILE)
    }

    /// Count record of batch `batch` (1-based)
    pub fn count_path(&self, date: NaiveDate, batch: usize) -> PathBuf {
        self.root
            .join(format!("{}{}_{}.json", COUNT_FILE_PREFIX, format_date(date), batch))
    }

    pub fn totals_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{}{}.json", TOTALS_FILE_PREFIX, format_date(date)))
    }

    pub fn final_record_path(&self) -> PathBuf {
        self.root.join(FINAL_RECORD_FILE)
    }

    pub fn final_store(&self) -> IncrementalStore {
        IncrementalStore::new(self.final_record_path())
    }

    pub fn save_stations(&self, stops: &[StopFeature]) -> DownloaderResult<()> {
        save(&self.stations_path(), stops)
    }

    pub fn load_stations(&self) -> DownloaderResult<Vec<StopFeature>> {
        load_stage(&self.stations_path(), stage::DOWNLOAD_STATIONS)
    }

    pub fn save_hierarchy(&self, hierarchy: &Hierarchy) -> DownloaderResult<()> {
        save(&self.hierarchy_path(), hierarchy)
    }

    pub fn load_hierarchy(&self) -> DownloaderResult<Hierarchy> {
        load_stage(&self.hierarchy_path(), stage::BUILD_HIERARCHY)
    }

    pub fn save_count_record(
        &self,
        date: NaiveDate,
        batch: usize,
        record: &CountRecord,
    ) -> DownloaderResult<()> {
        save(&self.count_path(date, batch), record)
    }

    /// Batch indexes with a persisted count record for `date`, ascending
    pub fn list_count_records(&self, date: NaiveDate) -> DownloaderResult<Vec<usize>> {
        let prefix = format!("{}{}_", COUNT_FILE_PREFIX, format_date(date));

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut batches = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let index = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(index) = index {
                batches.push(index);
            }
        }
        batches.sort_unstable();
        Ok(batches)
    }

    /// Count record of one batch of `date`
    pub fn load_count_record(&self, date: NaiveDate, batch: usize) -> DownloaderResult<CountRecord> {
        load_stage(&self.count_path(date, batch), stage::COUNT)
    }

    /// Every count record of `date`
    ///
    /// # Errors
    /// [`DownloaderError::MissingStage`] when the date has not been counted.
    pub fn load_count_records(&self, date: NaiveDate) -> DownloaderResult<Vec<BatchCounts>> {
        let indexes = self.list_count_records(date)?;
        if indexes.is_empty() {
            return Err(DownloaderError::MissingStage {
                stage: stage::COUNT,
                path: self.count_path(date, 1),
            });
        }

        indexes
            .into_iter()
            .map(|batch| -> DownloaderResult<BatchCounts> {
                let record = read_json(&self.count_path(date, batch))?;
                Ok(BatchCounts { batch, record })
            })
            .collect()
    }

    /// Delete every count record of `date`, returning how many were removed
    pub fn remove_count_records(&self, date: NaiveDate) -> DownloaderResult<usize> {
        let indexes = self.list_count_records(date)?;
        for batch in &indexes {
            let path = self.count_path(date, *batch);
            std::fs::remove_file(&path)?;
            debug!(path = %path.display(), "Removed stale count record");
        }
        Ok(indexes.len())
    }

    pub fn save_totals(&self, date: NaiveDate, totals: &ParentTotals) -> DownloaderResult<()> {
        save(&self.totals_path(date), totals)
    }

    pub fn load_totals(&self, date: NaiveDate) -> DownloaderResult<ParentTotals> {
        load_stage(&self.totals_path(date), stage::AGGREGATE)
    }

    /// Delete the totals of `date`; `false` when there were none
    pub fn remove_totals(&self, date: NaiveDate) -> DownloaderResult<bool> {
        let path = self.totals_path(date);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stale totals");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn save<T: Serialize + ?Sized>(path: &Path, value: &T) -> DownloaderResult<()> {
    write_json_atomic(path, value)?;
    debug!(path = %path.display(), "Saved");
    Ok(())
}

fn load_stage<T: DeserializeOwned>(path: &Path, stage: &'static str) -> DownloaderResult<T> {
    if !path.exists() {
        return Err(DownloaderError::MissingStage {
            stage,
            path: path.to_path_buf(),
        });
    }
    Ok(read_json(path)?)
}
