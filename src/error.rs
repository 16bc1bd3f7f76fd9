//! Harvest error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Unsupported listing kind: {0}")]
    UnsupportedKind(String),
    #[error("[{listing}] page didn't load properly (selector {selector} not found within {timeout:?})")]
    PageNotReady {
        listing: String,
        selector: String,
        timeout: Duration,
    },
    #[error("[{listing}] no data arrived within {waited:?}")]
    FirstDataTimeout { listing: String, waited: Duration },
    #[error("Listing not registered: {0}")]
    UnknownListing(String),
    #[error("Output sink error: {0}")]
    Sink(String),
    #[error("Enqueue error: {0}")]
    Enqueue(String),
    #[error("Drive step failed: {0}")]
    Driver(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Whether the surrounding session should retry the whole page load.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HarvestError::PageNotReady { .. })
    }
}

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;
