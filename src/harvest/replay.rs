//! Offline replay of a recorded page session.
//!
//! A recording holds the listing, its embedded page data, the responses seen
//! during page load and, per drive step, the responses that step provoked.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::coordinator::EntryMode;
use super::driver::{response_channel, InterceptedResponse, PageDriver, ResponseFeed, ResponseSender};
use super::session::ListingRun;
use crate::error::{HarvestError, Result};
use crate::models::{EmbeddedData, ListingContext, ListingIdentity};

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub url: String,
    #[serde(default = "default_status")]
    pub status: u16,
    /// JSON body, or a string holding the raw body text.
    #[serde(default)]
    pub body: Value,
}

impl From<RecordedResponse> for InterceptedResponse {
    fn from(recorded: RecordedResponse) -> Self {
        let body = match recorded.body {
            Value::String(raw) => raw,
            other => other.to_string(),
        };
        InterceptedResponse::new(recorded.url, recorded.status, body)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedSession {
    pub listing: ListingIdentity,
    #[serde(default)]
    pub context: ListingContext,
    #[serde(default)]
    pub embedded: Option<EmbeddedData>,
    /// Replay with the initial batch only.
    #[serde(default)]
    pub initial_only: bool,
    #[serde(default)]
    pub initial_responses: Vec<RecordedResponse>,
    #[serde(default)]
    pub steps: Vec<Vec<RecordedResponse>>,
}

impl RecordedSession {
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HarvestError::Driver(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| HarvestError::Driver(format!("{}: {}", path.display(), e)))
    }

    /// Split into a runnable listing, a driver and the feed it writes to.
    ///
    /// Responses recorded during page load are already queued on the feed.
    pub fn into_parts(self) -> (ListingRun, ReplayDriver, ResponseFeed) {
        let total = self.initial_responses.len() + self.steps.iter().map(Vec::len).sum::<usize>();
        let (tx, feed) = response_channel(total.max(1));

        for response in self.initial_responses {
            // Capacity covers every recorded response.
            let _ = tx.try_send(response.into());
        }

        let run = ListingRun {
            identity: self.listing,
            context: self.context,
            embedded: self.embedded,
            mode: if self.initial_only {
                EntryMode::InitialOnly
            } else {
                EntryMode::Drive
            },
        };
        let driver = ReplayDriver {
            steps: self.steps.into(),
            tx,
            advanced: 0,
        };
        (run, driver, feed)
    }
}

/// Releases one recorded step of responses per drive step.
pub struct ReplayDriver {
    steps: VecDeque<Vec<RecordedResponse>>,
    tx: ResponseSender,
    advanced: usize,
}

impl ReplayDriver {
    /// Drive steps performed so far, including those past the recording.
    pub fn advanced(&self) -> usize {
        self.advanced
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl PageDriver for ReplayDriver {
    async fn advance(&mut self) -> Result<()> {
        self.advanced += 1;
        let Some(step) = self.steps.pop_front() else {
            return Ok(());
        };
        for response in step {
            self.tx
                .send(response.into())
                .await
                .map_err(|_| HarvestError::Driver("response feed closed".to_string()))?;
        }
        Ok(())
    }
}
