//! Per-listing pagination state machine.
//!
//! `AwaitingFirstData -> Active -> Terminated`. Responses that arrive while
//! the coordinator is settling are ingested by the correlator on another
//! task; the coordinator only reads their effect through the policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::correlator::ResponseCorrelator;
use super::driver::PageDriver;
use super::parser;
use super::policy::{Continuation, ContinuationPolicy, StopReason};
use crate::error::{HarvestError, Result};
use crate::models::{EmbeddedData, ListingIdentity, SnapshotSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    AwaitingFirstData,
    Active,
    Terminated(StopReason),
}

/// How far the coordinator may go after the first data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryMode {
    #[default]
    Drive,
    /// Emit whatever the page loads initially, never drive.
    InitialOnly,
}

/// Final state of a listing after its coordinator terminated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingReport {
    pub listing: String,
    pub emitted: usize,
    pub total_count_hint: Option<u64>,
    pub has_next_page: Option<bool>,
    pub last_emitted_timestamp: Option<DateTime<Utc>>,
    pub drive_steps: u64,
    pub stop_reason: StopReason,
}

pub struct PaginationCoordinator {
    identity: ListingIdentity,
    correlator: Arc<ResponseCorrelator>,
    policy: ContinuationPolicy,
    settle_delay: Duration,
    first_data_timeout: Duration,
    phase: CoordinatorPhase,
    drive_steps: u64,
}

impl PaginationCoordinator {
    pub fn new(
        identity: ListingIdentity,
        correlator: Arc<ResponseCorrelator>,
        policy: ContinuationPolicy,
    ) -> Self {
        Self {
            identity,
            correlator,
            policy,
            settle_delay: Duration::from_millis(1500),
            first_data_timeout: Duration::from_secs(60),
            phase: CoordinatorPhase::AwaitingFirstData,
            drive_steps: 0,
        }
    }

    /// Default settle delay; the listing's own scroll wait takes precedence.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_first_data_timeout(mut self, timeout: Duration) -> Self {
        self.first_data_timeout = timeout;
        self
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    pub fn drive_steps(&self) -> u64 {
        self.drive_steps
    }

    fn transition(&mut self, phase: CoordinatorPhase) {
        debug!("[{}] {:?} -> {:?}", self.identity, self.phase, phase);
        self.phase = phase;
    }

    /// Run the listing to termination.
    pub async fn run(
        &mut self,
        embedded: Option<&EmbeddedData>,
        mode: EntryMode,
        driver: &mut dyn PageDriver,
    ) -> Result<ListingReport> {
        let entry = self
            .correlator
            .store()
            .entry(&self.identity.key())
            .await
            .ok_or_else(|| HarvestError::UnknownListing(self.identity.to_string()))?;

        let initial = embedded.and_then(|data| parser::parse_embedded(self.identity.kind, data));
        match initial {
            Some(timeline) => {
                let outcome = self
                    .correlator
                    .ingest(&self.identity, timeline, SnapshotSource::Embedded)
                    .await?;
                if outcome.needs_enqueue && outcome.received == 0 {
                    return self.finish(StopReason::Exhausted).await;
                }
            }
            None => {
                info!("[{}] Waiting for initial data to load", self.identity);
                if !entry.wait_first_data(self.first_data_timeout).await {
                    return Err(HarvestError::FirstDataTimeout {
                        listing: self.identity.to_string(),
                        waited: self.first_data_timeout,
                    });
                }
            }
        }
        self.transition(CoordinatorPhase::Active);

        if mode == EntryMode::InitialOnly {
            return self.finish(StopReason::InitialOnly).await;
        }

        let settle = self.identity.settle_delay(self.settle_delay);
        loop {
            if let Continuation::Stop(reason) = self.policy.evaluate(&self.identity).await? {
                return self.finish(reason).await;
            }

            let before = entry.lock().await.progress_marker();
            driver.advance().await?;
            self.drive_steps += 1;
            driver.settle(settle).await;

            let mut state = entry.lock().await;
            if state.progress_marker() == before {
                state.record_idle_step();
                debug!(
                    "[{}] Drive step {} produced no data (streak {})",
                    self.identity, self.drive_steps, state.no_new_items_streak
                );
            }
        }
    }

    async fn finish(&mut self, reason: StopReason) -> Result<ListingReport> {
        self.transition(CoordinatorPhase::Terminated(reason));
        let state = self
            .correlator
            .store()
            .snapshot(&self.identity.key())
            .await
            .ok_or_else(|| HarvestError::UnknownListing(self.identity.to_string()))?;

        info!(
            "[{}] Finished ({}), {} {}s after {} drive steps",
            self.identity,
            reason,
            state.emitted_count(),
            self.identity.kind.label(),
            self.drive_steps
        );

        Ok(ListingReport {
            listing: self.identity.to_string(),
            emitted: state.emitted_count(),
            total_count_hint: state.total_count_hint,
            has_next_page: state.has_next_page(),
            last_emitted_timestamp: state.last_emitted_timestamp,
            drive_steps: self.drive_steps,
            stop_reason: reason,
        })
    }
}
