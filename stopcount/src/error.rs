//! Error types for stopcount
//!
//! Four failure kinds cross stage boundaries:
//! - [`TransportError`]: one page request failed; contained inside the
//!   wavefront counter and reported as a degraded batch
//! - [`ResolutionError`]: a child station cannot be attached to a top-level
//!   station; aborts hierarchy construction
//! - [`ConsistencyError`]: a count is keyed by a stop unknown to the
//!   hierarchy; aborts aggregation
//! - `StoreCorruption`: the durable record does not parse; aborts publishing

use std::path::PathBuf;
use thiserror::Error;

/// A single page request failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// A child station whose ancestry cannot be resolved
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// Parent reference names no known top-level station
    #[error("Stop {child} references parent {parent}, which is not a top-level station")]
    Dangling { child: String, parent: String },

    /// Parent chain is longer than top-level → child → grandchild
    #[error("Stop {station} is nested too deep (its parent {parent} is itself a grandchild)")]
    TooDeep { station: String, parent: String },
}

/// A count keyed by a stop the hierarchy does not know
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stop {stop_id} in count batch {batch} is unknown to the hierarchy")]
pub struct ConsistencyError {
    pub stop_id: String,
    pub batch: usize,
}

/// Stage-level error
#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    /// Durable record exists but cannot be parsed
    #[error("Record store {path} is corrupt: {reason}")]
    StoreCorruption { path: PathBuf, reason: String },

    /// A prerequisite stage has not produced its output yet
    #[error("Missing output of stage '{stage}': {path} (run `stopcount {stage}` first)")]
    MissingStage { stage: &'static str, path: PathBuf },

    /// A record kept for `--resume` was counted under another schedule
    #[error(
        "Count record {path} does not cover batch {batch} of the current schedule \
         (batch size or hierarchy changed); run `stopcount count` without --resume"
    )]
    ResumeMismatch { batch: usize, path: PathBuf },

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Common error: {0}")]
    Common(#[from] stopcount_common::Error),
}

/// Result type for stage operations
pub type DownloaderResult<T> = Result<T, DownloaderError>;

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}
