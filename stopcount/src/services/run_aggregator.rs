//! Per-date aggregation
//!
//! Folds every persisted batch of one date into parent station totals. A
//! parent's own count and the counts of all its children are summed;
//! batches are summed too, never overwritten.

use crate::error::ConsistencyError;
use crate::models::{BatchCounts, Hierarchy, ParentTotals};
use tracing::{debug, info};

/// Sum all batches of one date into parent totals
///
/// Only parents that appear in at least one batch (directly or through a
/// child) are present in the output. Publishing fills the rest with 0.
///
/// # Errors
/// A stop id unknown to the hierarchy means the hierarchy and the counts
/// were taken from different snapshots; the first one found is reported.
pub fn aggregate(
    hierarchy: &Hierarchy,
    batches: &[BatchCounts],
) -> Result<ParentTotals, ConsistencyError> {
    let child_parent = hierarchy.child_parent_map();
    let mut totals = ParentTotals::new();

    for batch in batches {
        for (stop_id, count) in batch.record.iter() {
            let parent = if hierarchy.contains_parent(stop_id) {
                stop_id.as_str()
            } else {
                match child_parent.get(stop_id.as_str()) {
                    Some(parent) => *parent,
                    None => {
                        return Err(ConsistencyError {
                            stop_id: stop_id.clone(),
                            batch: batch.batch,
                        })
                    }
                }
            };

            *totals.entry(parent.to_string()).or_insert(0) += count;
        }
        debug!(batch = batch.batch, stops = batch.record.len(), "Batch folded");
    }

    info!(
        batches = batches.len(),
        parents = totals.len(),
        stop_times = totals.values().sum::<u64>(),
        "Date aggregated"
    );
    Ok(totals)
}
