//! Test Helper Utilities
//!
//! Shared utilities for testing stopcount

#![allow(dead_code)]

pub mod fake_api;

pub use fake_api::{stop, test_date, test_pipeline, CountingCooldown, FakeApi};
