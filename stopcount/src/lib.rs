//! stopcount library interface
//!
//! Exposes the pipeline stages and their building blocks for the binary and
//! for integration testing.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod types;

pub use crate::error::{DownloaderError, DownloaderResult};
pub use crate::services::pipeline::{CountSettings, CountSummary, Pipeline};
pub use crate::storage::DataDir;
