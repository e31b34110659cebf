//! Station hierarchy construction
//!
//! Builds the parent → children index from the flat GTFS stop list.
//!
//! Pass 1 walks the stops in order. A stop without a parent becomes a
//! top-level station; a stop with a parent is queued under that parent id,
//! which may not have been seen yet (a placeholder).
//!
//! Pass 2 reconciles the placeholders. A placeholder that matches a
//! top-level station gets its children attached. A placeholder that is
//! itself a child of a top-level station (a grandchild level) has its
//! children folded into that top-level station and disappears. Anything
//! else is a [`ResolutionError`].

use crate::error::ResolutionError;
use crate::models::{Hierarchy, Station, StopFeature, StopProperties};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Incremental hierarchy builder
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    /// Top-level stations
    parents: BTreeMap<String, Station>,
    /// Parent reference → children declaring it, in declaration order
    pending: BTreeMap<String, Vec<String>>,
    /// stop id → declared parent, first declaration wins
    declared: HashMap<String, Option<String>>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one stop
    pub fn add(&mut self, stop: &StopProperties) {
        if let Some(previous) = self.declared.get(&stop.stop_id) {
            if previous != &stop.parent_station {
                warn!(
                    stop_id = %stop.stop_id,
                    kept = ?previous,
                    ignored = ?stop.parent_station,
                    "Conflicting parent declaration ignored (first seen wins)"
                );
            }
            return;
        }
        self.declared
            .insert(stop.stop_id.clone(), stop.parent_station.clone());

        match &stop.parent_station {
            Some(parent_id) => {
                self.pending
                    .entry(parent_id.clone())
                    .or_default()
                    .push(stop.stop_id.clone());
            }
            None => {
                self.parents.insert(
                    stop.stop_id.clone(),
                    Station::new(stop.stop_name.clone(), stop.location()),
                );
            }
        }
    }

    /// Reconcile placeholders and produce the hierarchy
    pub fn build(self) -> Result<Hierarchy, ResolutionError> {
        let HierarchyBuilder {
            mut parents,
            pending,
            declared,
        } = self;

        // Direct children of top-level stations
        let mut direct_parent: HashMap<String, String> = HashMap::new();
        let mut nested: Vec<(String, Vec<String>)> = Vec::new();

        for (parent_id, children) in pending {
            match parents.get_mut(&parent_id) {
                Some(station) => {
                    for child in children {
                        direct_parent.insert(child.clone(), parent_id.clone());
                        push_unique(&mut station.children, child);
                    }
                }
                None => nested.push((parent_id, children)),
            }
        }

        let mut folded = 0usize;
        for (intermediate, children) in nested {
            let first_child = children.first().cloned().unwrap_or_default();

            let top = match direct_parent.get(&intermediate) {
                Some(top) => top,
                None => {
                    return Err(match declared.get(&intermediate) {
                        Some(Some(_)) => ResolutionError::TooDeep {
                            station: first_child,
                            parent: intermediate,
                        },
                        _ => ResolutionError::Dangling {
                            child: first_child,
                            parent: intermediate,
                        },
                    });
                }
            };

            // `top` was taken from `parents` in the loop above
            if let Some(station) = parents.get_mut(top) {
                debug!(
                    intermediate = %intermediate,
                    top = %top,
                    children = children.len(),
                    "Folding nested children into top-level station"
                );
                for child in children {
                    push_unique(&mut station.children, child);
                    folded += 1;
                }
            }
        }

        let hierarchy = Hierarchy::new(parents);
        info!(
            parents = hierarchy.len(),
            entities = hierarchy.entity_count(),
            folded,
            "Station hierarchy built"
        );
        Ok(hierarchy)
    }
}

fn push_unique(children: &mut Vec<String>, child: String) {
    if !children.contains(&child) {
        children.push(child);
    }
}

/// Build the hierarchy from raw stops in one call
pub fn build_hierarchy(stops: &[StopFeature]) -> Result<Hierarchy, ResolutionError> {
    let mut builder = HierarchyBuilder::new();
    for stop in stops {
        builder.add(&stop.properties);
    }
    builder.build()
}
