//! Service modules for the stop count pipeline
//!
//! Building blocks, in pipeline order:
//! - [`golemio_client`]: remote API (stops list, stop times pages)
//! - [`hierarchy_builder`]: raw stops → parent/children index
//! - [`chunked_scheduler`]: hierarchy → bounded batches, cooldown policy
//! - [`wavefront_counter`]: one batch → per-stop counts
//! - [`run_aggregator`]: all batches of a date → parent totals
//! - [`incremental_store`]: parent totals → durable multi-date record
//!
//! [`pipeline`] drives them as re-runnable stages over the data folder.

pub mod chunked_scheduler;
pub mod golemio_client;
pub mod hierarchy_builder;
pub mod incremental_store;
pub mod pipeline;
pub mod run_aggregator;
pub mod wavefront_counter;

pub use chunked_scheduler::{Batch, ChunkedScheduler, CooldownPolicy, FixedCooldown, NoCooldown};
pub use golemio_client::GolemioClient;
pub use hierarchy_builder::{build_hierarchy, HierarchyBuilder};
pub use incremental_store::IncrementalStore;
pub use pipeline::Pipeline;
pub use run_aggregator::aggregate;
pub use wavefront_counter::{BatchReport, Cursor, WavefrontCounter};
