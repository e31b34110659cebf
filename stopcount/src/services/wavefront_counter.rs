//! Wavefront pagination counter
//!
//! Counts the stop times of every stop in one batch by paging each stop to
//! exhaustion. The remote endpoint gives no totals, so the only way to learn
//! a count is to keep asking for the next page until an empty one arrives.
//!
//! # Execution model
//! - Every stop starts as `Active { offset: 0, accumulated: 0 }`
//! - Wave k issues one page request for each stop still active, at most
//!   `concurrency` in flight at a time
//! - A non-empty page advances the cursor; an empty page finishes it
//! - The driver waits for the whole wave to drain before computing the next
//!   active set, so total latency is bounded by the deepest stop, not by the
//!   sum of all pages
//!
//! Workers only return results. Cursor state is owned by the driver and
//! updated at the wave barrier.
//!
//! A failed request abandons that stop: the count accumulated so far stands
//! (an under-count) and the batch is reported as degraded.

use crate::error::{DownloaderError, DownloaderResult, TransportError};
use crate::models::CountRecord;
use crate::types::{PageRequest, PageSource, StopTime};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pagination state of one stop within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// More pages may follow
    Active { offset: u64, accumulated: u64 },
    /// An empty page was received
    Done { accumulated: u64 },
    /// A request failed; the count is a lower bound
    Abandoned { accumulated: u64 },
}

impl Cursor {
    pub fn start() -> Self {
        Cursor::Active {
            offset: 0,
            accumulated: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Cursor::Active { .. })
    }

    pub fn accumulated(&self) -> u64 {
        match *self {
            Cursor::Active { accumulated, .. }
            | Cursor::Done { accumulated }
            | Cursor::Abandoned { accumulated } => accumulated,
        }
    }

    /// Apply a page of `page_len` items
    pub fn advance(self, page_len: u64) -> Self {
        match self {
            Cursor::Active { accumulated, .. } if page_len == 0 => Cursor::Done { accumulated },
            Cursor::Active { accumulated, .. } => {
                let accumulated = accumulated + page_len;
                Cursor::Active {
                    offset: accumulated,
                    accumulated,
                }
            }
            finished => finished,
        }
    }

    /// Give up on this stop, keeping what was counted
    pub fn abandon(self) -> Self {
        match self {
            Cursor::Active { accumulated, .. } => Cursor::Abandoned { accumulated },
            finished => finished,
        }
    }
}

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Count per stop, every stop of the batch present
    pub record: CountRecord,
    /// Waves executed
    pub waves: usize,
    /// Page requests issued
    pub requests: usize,
    /// Stops whose pagination was abandoned after a transport error
    pub degraded: Vec<String>,
}

impl BatchReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Result of one page request, tagged with its cursor slot
struct PageOutcome {
    slot: usize,
    request: PageRequest,
    result: Result<Vec<StopTime>, TransportError>,
}

/// Wavefront counter over a [`PageSource`]
pub struct WavefrontCounter<'a, S: PageSource + ?Sized> {
    source: &'a S,
    concurrency: usize,
    page_size: u32,
}

impl<'a, S: PageSource + ?Sized> WavefrontCounter<'a, S> {
    /// `concurrency` and `page_size` below 1 are treated as 1
    pub fn new(source: &'a S, concurrency: usize, page_size: u32) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Page every stop in `stop_ids` to exhaustion for `date`
    ///
    /// Cancellation is honoured only between waves; an in-flight wave always
    /// drains first. A cancelled batch returns [`DownloaderError::Cancelled`]
    /// and produces no record.
    pub async fn count(
        &self,
        stop_ids: Vec<String>,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> DownloaderResult<BatchReport> {
        let mut seen = HashSet::with_capacity(stop_ids.len());
        let mut cursors: Vec<(String, Cursor)> = stop_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .map(|id| (id, Cursor::start()))
            .collect();

        let mut waves = 0usize;
        let mut requests = 0usize;
        let mut degraded = Vec::new();

        loop {
            let frontier: Vec<(usize, PageRequest)> = cursors
                .iter()
                .enumerate()
                .filter_map(|(slot, (stop_id, cursor))| match *cursor {
                    Cursor::Active { offset, .. } => Some((
                        slot,
                        PageRequest {
                            stop_id: stop_id.clone(),
                            date,
                            offset,
                            limit: self.page_size,
                        },
                    )),
                    _ => None,
                })
                .collect();

            if frontier.is_empty() {
                break;
            }

            if cancel.is_cancelled() {
                info!(wave = waves, active = frontier.len(), "Batch cancelled at wave boundary");
                return Err(DownloaderError::Cancelled);
            }

            debug!(wave = waves, active = frontier.len(), "Starting wave");
            requests += frontier.len();

            let source = self.source;
            let outcomes: Vec<PageOutcome> = stream::iter(frontier)
                .map(|(slot, request)| async move {
                    let result = source.fetch_page(&request).await;
                    PageOutcome {
                        slot,
                        request,
                        result,
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            // Wave barrier: fold results into driver-owned state
            for outcome in outcomes {
                let (_, cursor) = &mut cursors[outcome.slot];
                match outcome.result {
                    Ok(items) => {
                        let foreign = items
                            .iter()
                            .filter(|item| {
                                matches!(item.stop_id.as_deref(), Some(id) if id != outcome.request.stop_id)
                            })
                            .count();
                        if foreign > 0 {
                            warn!(
                                stop_id = %outcome.request.stop_id,
                                offset = outcome.request.offset,
                                foreign,
                                "Page contains items of other stops"
                            );
                        }
                        *cursor = cursor.advance(items.len() as u64);
                    }
                    Err(e) => {
                        error!(
                            stop_id = %outcome.request.stop_id,
                            offset = outcome.request.offset,
                            error = %e,
                            "Page request failed, abandoning stop"
                        );
                        *cursor = cursor.abandon();
                        degraded.push(outcome.request.stop_id);
                    }
                }
            }

            waves += 1;
        }

        let record: CountRecord = cursors
            .into_iter()
            .map(|(stop_id, cursor)| (stop_id, cursor.accumulated()))
            .collect();

        if !degraded.is_empty() {
            degraded.sort();
            warn!(
                failed_stops = degraded.len(),
                "Degraded batch: some counts are lower bounds"
            );
        }

        info!(
            stops = record.len(),
            waves,
            requests,
            stop_times = record.total(),
            "Batch counted"
        );

        Ok(BatchReport {
            record,
            waves,
            requests,
            degraded,
        })
    }
}
