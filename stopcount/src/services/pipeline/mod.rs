//! Stage drivers
//!
//! # Stages
//! download-stations → build-hierarchy → count(date) → aggregate(date) → publish(date)
//!
//! Each stage reads the persisted output of the stage before it from the
//! data folder and persists its own, so any stage can be re-run alone. A
//! failing stage leaves the outputs of earlier stages intact.
//!
//! - `download-stations`: [`Pipeline::download_stations`]
//! - `build-hierarchy`: [`Pipeline::build_hierarchy`]
//! - `count`: [`Pipeline::count`], batches of the hierarchy through the
//!   wavefront counter with a cooldown in between
//! - `aggregate`: [`Pipeline::aggregate`]
//! - `publish`: [`Pipeline::publish`]
//!
//! [`Pipeline::run`] chains count, aggregate and publish for one date.

use crate::error::DownloaderResult;
use crate::services::chunked_scheduler::{CooldownPolicy, FixedCooldown};
use crate::storage::DataDir;
use crate::types::{PageSource, StationSource};
use chrono::NaiveDate;
use std::sync::Arc;
use stopcount_common::config::GolemioConfig;
use stopcount_common::time::secs_to_duration;
use tokio_util::sync::CancellationToken;

mod stage_aggregate;
mod stage_count;
mod stage_hierarchy;
mod stage_publish;
mod stage_stations;

/// Scheduling parameters of the count stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountSettings {
    pub page_size: u32,
    pub concurrency: usize,
    pub batch_size: usize,
}

impl From<&GolemioConfig> for CountSettings {
    fn from(config: &GolemioConfig) -> Self {
        Self {
            page_size: config.page_size,
            concurrency: config.concurrency,
            batch_size: config.batch_size,
        }
    }
}

/// Outcome of one count stage run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountSummary {
    pub date: NaiveDate,
    /// Batches in the schedule
    pub batches: usize,
    /// Batches counted by this run
    pub counted: usize,
    /// Batches skipped because a record already existed (resume)
    pub skipped: usize,
    /// Stop times counted by this run
    pub stop_times: u64,
    /// Batches with at least one abandoned stop
    pub degraded_batches: Vec<usize>,
}

impl CountSummary {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_batches.is_empty()
    }
}

/// Runs the stages against one data folder
pub struct Pipeline {
    data: DataDir,
    pages: Arc<dyn PageSource>,
    stations: Arc<dyn StationSource>,
    settings: CountSettings,
    cooldown: Arc<dyn CooldownPolicy>,
}

impl Pipeline {
    /// Create a pipeline with a fixed cooldown of `config.cooldown_secs`
    pub fn new(
        data: DataDir,
        pages: Arc<dyn PageSource>,
        stations: Arc<dyn StationSource>,
        config: &GolemioConfig,
    ) -> Self {
        Self {
            data,
            pages,
            stations,
            settings: CountSettings::from(config),
            cooldown: Arc::new(FixedCooldown::new(secs_to_duration(config.cooldown_secs))),
        }
    }

    /// Replace the pause taken between batches
    pub fn with_cooldown(mut self, cooldown: Arc<dyn CooldownPolicy>) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_settings(mut self, settings: CountSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn data(&self) -> &DataDir {
        &self.data
    }

    pub fn settings(&self) -> CountSettings {
        self.settings
    }

    /// count → aggregate → publish for one date
    pub async fn run(
        &self,
        date: NaiveDate,
        resume: bool,
        cancel: &CancellationToken,
    ) -> DownloaderResult<CountSummary> {
        let summary = self.count(date, resume, cancel).await?;
        self.aggregate(date).await?;
        self.publish(date).await?;
        Ok(summary)
    }
}
