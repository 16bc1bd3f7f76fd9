//! scrollharvest - incremental harvesting of infinite-scroll listings.
//!
//! Combines data embedded in the initial page load with intercepted
//! pagination responses, deduplicates items per listing and emits them with
//! gap-free positions.

#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod error;
pub mod harvest;
pub mod models;

pub use error::{HarvestError, Result};
