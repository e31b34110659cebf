//! Batch scheduling
//!
//! Splits the hierarchy into batches of at most `batch_size` parent stations
//! (each carrying all of its children). Batches are produced lazily and in a
//! stable order, so iteration can be restarted or resumed from any batch
//! index.
//!
//! Between two batches the driver waits on a [`CooldownPolicy`] to bound the
//! call rate against the remote service.

use crate::models::{Hierarchy, Station};
use async_trait::async_trait;
use std::collections::btree_map;
use std::time::Duration;

/// A bounded partition of the hierarchy
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    /// 1-based position in the schedule
    pub index: usize,
    pub parents: Vec<(&'a String, &'a Station)>,
}

impl<'a> Batch<'a> {
    /// Number of parent stations in the batch
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Flattened work list: each parent followed by its children
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.parents.iter().map(|(_, s)| 1 + s.children.len()).sum());
        for (parent_id, station) in &self.parents {
            ids.push((*parent_id).clone());
            ids.extend(station.children.iter().cloned());
        }
        ids
    }
}

/// Lazy batch schedule over a hierarchy
#[derive(Debug, Clone, Copy)]
pub struct ChunkedScheduler<'a> {
    hierarchy: &'a Hierarchy,
    batch_size: usize,
}

impl<'a> ChunkedScheduler<'a> {
    /// `batch_size` below 1 is treated as 1
    pub fn new(hierarchy: &'a Hierarchy, batch_size: usize) -> Self {
        Self {
            hierarchy,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Total number of batches in the schedule
    pub fn batch_count(&self) -> usize {
        self.hierarchy.len().div_ceil(self.batch_size)
    }

    /// All batches from the first one
    pub fn batches(&self) -> Batches<'a> {
        self.batches_from(1)
    }

    /// Batches starting at the 1-based `index`
    pub fn batches_from(&self, index: usize) -> Batches<'a> {
        let index = index.max(1);
        let mut parents = self.hierarchy.iter();
        // nth(n) consumes n + 1 items
        let skip = (index - 1).saturating_mul(self.batch_size);
        if skip > 0 {
            parents.nth(skip - 1);
        }
        Batches {
            parents,
            batch_size: self.batch_size,
            next_index: index,
        }
    }
}

/// Iterator over the batches of a [`ChunkedScheduler`]
#[derive(Debug)]
pub struct Batches<'a> {
    parents: btree_map::Iter<'a, String, Station>,
    batch_size: usize,
    next_index: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let parents: Vec<_> = self.parents.by_ref().take(self.batch_size).collect();
        if parents.is_empty() {
            return None;
        }

        let batch = Batch {
            index: self.next_index,
            parents,
        };
        self.next_index += 1;
        Some(batch)
    }
}

/// Pause taken between two consecutive batches
#[async_trait]
pub trait CooldownPolicy: Send + Sync {
    /// Called after `completed_batch` when another batch follows
    async fn cooldown(&self, completed_batch: usize);
}

/// Fixed pause; not interruptible once started
#[derive(Debug, Clone, Copy)]
pub struct FixedCooldown {
    pause: Duration,
}

impl FixedCooldown {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

#[async_trait]
impl CooldownPolicy for FixedCooldown {
    async fn cooldown(&self, completed_batch: usize) {
        if self.pause.is_zero() {
            return;
        }
        tracing::info!(
            batch = completed_batch,
            pause_secs = self.pause.as_secs_f64(),
            "Cooling down before next batch"
        );
        tokio::time::sleep(self.pause).await;
        tracing::debug!(batch = completed_batch, "Cooldown finished");
    }
}

/// No pause at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCooldown;

#[async_trait]
impl CooldownPolicy for NoCooldown {
    async fn cooldown(&self, _completed_batch: usize) {}
}
