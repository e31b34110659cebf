//! count: page every stop of the hierarchy for one date, batch by batch
//!
//! Batches run strictly in sequence. Each batch record is written before the
//! next batch starts, so a crash loses at most the batch in flight. The
//! cooldown policy runs between two counted batches, never after the last.
//!
//! Cancellation is observed before each batch and at every wave boundary
//! inside a batch. A cancelled batch is not persisted.

use super::{CountSummary, Pipeline};
use crate::error::{DownloaderError, DownloaderResult};
use crate::services::chunked_scheduler::ChunkedScheduler;
use crate::services::wavefront_counter::WavefrontCounter;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use stopcount_common::time::format_date;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Pipeline {
    /// Count `date` for the whole hierarchy
    ///
    /// With `resume`, batches that already have a record for the date are
    /// skipped, provided every such record covers exactly the stops of its
    /// batch under the current schedule. Without it, existing records for the
    /// date are deleted first so two different partitionings never get mixed.
    /// Either way the date's totals are deleted, so `publish` cannot pick up
    /// totals of an earlier count.
    pub async fn count(
        &self,
        date: NaiveDate,
        resume: bool,
        cancel: &CancellationToken,
    ) -> DownloaderResult<CountSummary> {
        let hierarchy = self.data.load_hierarchy()?;
        let scheduler = ChunkedScheduler::new(&hierarchy, self.settings.batch_size);
        let counter = WavefrontCounter::new(
            self.pages.as_ref(),
            self.settings.concurrency,
            self.settings.page_size,
        );

        let finished: BTreeSet<usize> = if resume {
            let finished: BTreeSet<usize> =
                self.data.list_count_records(date)?.into_iter().collect();
            self.check_resumable(&scheduler, date, &finished)?;
            finished
        } else {
            let removed = self.data.remove_count_records(date)?;
            if removed > 0 {
                info!(removed, "Discarded count records of a previous run");
            }
            BTreeSet::new()
        };

        // Any count run changes the date's counts
        if self.data.remove_totals(date)? {
            info!(date = %format_date(date), "Discarded totals of a previous run");
        }

        info!(
            date = %format_date(date),
            parents = hierarchy.len(),
            entities = hierarchy.entity_count(),
            batches = scheduler.batch_count(),
            batch_size = scheduler.batch_size(),
            resume,
            "Stage count"
        );

        let mut summary = CountSummary {
            date,
            batches: scheduler.batch_count(),
            counted: 0,
            skipped: 0,
            stop_times: 0,
            degraded_batches: Vec::new(),
        };
        let mut previous: Option<usize> = None;

        for batch in scheduler.batches() {
            if finished.contains(&batch.index) {
                info!(batch = batch.index, "Batch already recorded, skipping");
                summary.skipped += 1;
                continue;
            }

            if cancel.is_cancelled() {
                info!(batch = batch.index, "Count cancelled before batch");
                return Err(DownloaderError::Cancelled);
            }

            if let Some(completed) = previous {
                self.cooldown.cooldown(completed).await;
            }

            info!(
                batch = batch.index,
                of = summary.batches,
                parents = batch.len(),
                "Counting batch"
            );

            let report = counter.count(batch.entity_ids(), date, cancel).await?;
            self.data.save_count_record(date, batch.index, &report.record)?;

            if report.is_degraded() {
                warn!(
                    batch = batch.index,
                    abandoned = report.degraded.len(),
                    "Batch saved with under-counted stops"
                );
                summary.degraded_batches.push(batch.index);
            }

            summary.counted += 1;
            summary.stop_times += report.record.total();
            previous = Some(batch.index);
        }

        info!(
            date = %format_date(date),
            counted = summary.counted,
            skipped = summary.skipped,
            stop_times = summary.stop_times,
            degraded = summary.degraded_batches.len(),
            "Count finished"
        );
        Ok(summary)
    }

    /// Every kept record must hold exactly the stops of the batch with the
    /// same index under the current schedule
    ///
    /// # Errors
    /// [`DownloaderError::ResumeMismatch`] for the first record that does not.
    fn check_resumable(
        &self,
        scheduler: &ChunkedScheduler<'_>,
        date: NaiveDate,
        finished: &BTreeSet<usize>,
    ) -> DownloaderResult<()> {
        if let Some(&last) = finished.iter().next_back() {
            if last > scheduler.batch_count() {
                return Err(self.resume_mismatch(date, last, scheduler));
            }
        }

        for batch in scheduler.batches().filter(|b| finished.contains(&b.index)) {
            let record = self.data.load_count_record(date, batch.index)?;
            let ids = batch.entity_ids();
            let expected: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
            let recorded: BTreeSet<&str> = record.iter().map(|(id, _)| id.as_str()).collect();

            if recorded != expected {
                debug!(
                    batch = batch.index,
                    missing = expected.difference(&recorded).count(),
                    unexpected = recorded.difference(&expected).count(),
                    "Count record does not match the current schedule"
                );
                return Err(self.resume_mismatch(date, batch.index, scheduler));
            }
        }

        debug!(records = finished.len(), "Kept count records match the schedule");
        Ok(())
    }

    fn resume_mismatch(
        &self,
        date: NaiveDate,
        batch: usize,
        scheduler: &ChunkedScheduler<'_>,
    ) -> DownloaderError {
        warn!(
            batch,
            batches = scheduler.batch_count(),
            batch_size = scheduler.batch_size(),
            "Cannot resume count"
        );
        DownloaderError::ResumeMismatch {
            batch,
            path: self.data.count_path(date, batch),
        }
    }
}
