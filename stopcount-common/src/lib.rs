//! # stopcount common library
//!
//! Shared code for the stopcount workspace:
//! - Configuration model and resolution
//! - Common error type
//! - Atomic file writes
//! - Date helpers

pub mod config;
pub mod error;
pub mod fs;
pub mod time;

pub use error::{Error, Result};
