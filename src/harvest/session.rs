//! Harvest session: owns listing state for one run and wires the response
//! feed to the coordinator.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, warn};
use uuid::Uuid;

use super::coordinator::{EntryMode, ListingReport, PaginationCoordinator};
use super::correlator::ResponseCorrelator;
use super::driver::{PageDriver, ResponseFeed};
use super::enqueue::TaskEnqueuer;
use super::policy::ContinuationPolicy;
use super::sink::OutputSink;
use super::state::ListingStateStore;
use crate::config::HarvestSettings;
use crate::error::{HarvestError, Result};
use crate::models::{EmbeddedData, ListingContext, ListingIdentity};

/// Everything needed to harvest one listing on an already loaded page.
#[derive(Debug, Clone)]
pub struct ListingRun {
    pub identity: ListingIdentity,
    pub context: ListingContext,
    pub embedded: Option<EmbeddedData>,
    pub mode: EntryMode,
}

impl ListingRun {
    pub fn new(identity: ListingIdentity) -> Self {
        Self {
            identity,
            context: ListingContext::default(),
            embedded: None,
            mode: EntryMode::Drive,
        }
    }

    pub fn with_context(mut self, context: ListingContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_embedded(mut self, embedded: EmbeddedData) -> Self {
        self.embedded = Some(embedded);
        self
    }

    pub fn with_mode(mut self, mode: EntryMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Dropping the session drops all of its listing state.
pub struct HarvestSession {
    id: Uuid,
    settings: HarvestSettings,
    store: ListingStateStore,
    correlator: Arc<ResponseCorrelator>,
}

impl HarvestSession {
    pub fn new(
        settings: HarvestSettings,
        sink: Arc<dyn OutputSink>,
        enqueuer: Option<Arc<dyn TaskEnqueuer>>,
    ) -> Self {
        let store = ListingStateStore::new();
        let mut correlator = ResponseCorrelator::new(store.clone(), sink);
        if let Some(enqueuer) = enqueuer {
            correlator = correlator.with_enqueuer(enqueuer);
        }
        Self {
            id: Uuid::new_v4(),
            settings,
            store,
            correlator: Arc::new(correlator),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    pub fn store(&self) -> &ListingStateStore {
        &self.store
    }

    pub fn policy(&self) -> ContinuationPolicy {
        ContinuationPolicy::new(self.store.clone(), self.settings.stall_threshold)
    }

    /// Harvest one listing until the continuation policy stops it.
    ///
    /// Responses from `feed` are ingested on a separate task while the
    /// coordinator drives the page. The feed task is torn down when the
    /// coordinator terminates; anything still queued is discarded.
    ///
    /// A sink or enqueue failure on the feed task ends the listing with that
    /// error, since the failed batch's ids already count as emitted.
    pub async fn run_listing(
        &self,
        run: ListingRun,
        driver: &mut dyn PageDriver,
        mut feed: ResponseFeed,
    ) -> Result<ListingReport> {
        let ListingRun {
            identity,
            context,
            embedded,
            mode,
        } = run;
        self.store.register(identity.clone(), context).await;

        let (failure_tx, mut failure_rx) = oneshot::channel::<HarvestError>();
        let feed_task = {
            let correlator = self.correlator.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                while let Some(response) = feed.recv().await {
                    if let Err(e) = correlator
                        .on_response(&identity, &response.url, response.status, &response.body)
                        .await
                    {
                        warn!("[{}] Failed to handle response: {}", identity, e);
                        let _ = failure_tx.send(e);
                        break;
                    }
                }
            })
        };

        let mut coordinator =
            PaginationCoordinator::new(identity.clone(), self.correlator.clone(), self.policy())
                .with_settle_delay(self.settings.settle_delay())
                .with_first_data_timeout(self.settings.first_data_timeout());
        let result = tokio::select! {
            biased;
            Ok(e) = &mut failure_rx => Err(e),
            result = coordinator.run(embedded.as_ref(), mode, driver) => result,
        };
        let result = match (result, failure_rx.try_recv()) {
            (Ok(_), Ok(e)) => Err(e),
            (result, _) => result,
        };

        feed_task.abort();
        if let Err(ref e) = result {
            error!("[{}] {}", identity, e);
        }
        result
    }
}
