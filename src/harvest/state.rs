//! Per-listing pagination state.
//!
//! The store is owned by a harvest session and shared by reference with the
//! coordinator and the correlator. Each listing has its own mutex, so all
//! read-modify-write of a listing's emitted ids goes through one writer at a
//! time while other listings progress independently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, MutexGuard, RwLock};

use crate::models::{ListingContext, ListingIdentity, ListingKey};

/// Mutable bookkeeping for one listing.
#[derive(Debug, Clone, Default)]
pub struct ListingState {
    /// Append-only.
    emitted_ids: HashSet<String>,
    /// True iff the most recent batch contributed zero new ids.
    pub all_duplicates: bool,
    pub last_emitted_timestamp: Option<DateTime<Utc>>,
    /// Consecutive batches (or idle drive steps) without a new id.
    pub no_new_items_streak: u32,
    /// None until the first timeline is seen; once false, stays false.
    has_next_page: Option<bool>,
    /// Set once any timeline for this listing asked for enqueueing.
    pub needs_enqueue: bool,
    pub total_count_hint: Option<u64>,
    /// Number of timelines ingested.
    pub batches: u64,
}

impl ListingState {
    pub fn emitted_count(&self) -> usize {
        self.emitted_ids.len()
    }

    pub fn has_emitted(&self, id: &str) -> bool {
        self.emitted_ids.contains(id)
    }

    pub fn emitted_ids(&self) -> impl Iterator<Item = &str> {
        self.emitted_ids.iter().map(|s| s.as_str())
    }

    /// Record an emitted id. Returns false if it was already present.
    pub(crate) fn insert_id(&mut self, id: String) -> bool {
        self.emitted_ids.insert(id)
    }

    pub fn has_next_page(&self) -> Option<bool> {
        self.has_next_page
    }

    /// Fold a newly observed has-more flag into the known value.
    ///
    /// The first observation is taken as-is. After that the flag may only
    /// go from true to false.
    pub fn reconcile_has_next_page(&mut self, observed: bool) -> bool {
        let effective = match self.has_next_page {
            None => observed,
            Some(known) => known && observed,
        };
        self.has_next_page = Some(effective);
        effective
    }

    /// Update duplicate tracking after a batch.
    pub fn record_batch(&mut self, newly_emitted: usize) {
        self.batches += 1;
        self.all_duplicates = newly_emitted == 0;
        if self.all_duplicates {
            self.no_new_items_streak += 1;
        } else {
            self.no_new_items_streak = 0;
        }
    }

    /// A drive step produced no batch at all.
    pub fn record_idle_step(&mut self) {
        self.no_new_items_streak += 1;
    }

    /// (emitted ids, batches) for detecting whether a drive step made progress.
    pub fn progress_marker(&self) -> (usize, u64) {
        (self.emitted_ids.len(), self.batches)
    }
}

/// A registered listing: its identity, caller context, state and first-data signal.
#[derive(Debug)]
pub struct ListingEntry {
    identity: ListingIdentity,
    context: ListingContext,
    state: Mutex<ListingState>,
    first_data: watch::Sender<bool>,
}

impl ListingEntry {
    fn new(identity: ListingIdentity, context: ListingContext) -> Self {
        let (first_data, _) = watch::channel(false);
        Self {
            identity,
            context,
            state: Mutex::new(ListingState::default()),
            first_data,
        }
    }

    pub fn identity(&self) -> &ListingIdentity {
        &self.identity
    }

    pub fn context(&self) -> &ListingContext {
        &self.context
    }

    /// Acquire the listing's single-writer lock.
    pub async fn lock(&self) -> MutexGuard<'_, ListingState> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> ListingState {
        self.state.lock().await.clone()
    }

    pub fn has_first_data(&self) -> bool {
        *self.first_data.borrow()
    }

    pub(crate) fn mark_first_data(&self) {
        self.first_data.send_replace(true);
    }

    /// Wait until the first timeline for this listing has been ingested.
    /// Returns false if `timeout` elapses first.
    pub async fn wait_first_data(&self, timeout: Duration) -> bool {
        let mut rx = self.first_data.subscribe();
        let seen = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|seen| *seen)).await,
            Ok(Ok(_))
        );
        seen
    }
}

/// Table of listing state, keyed by listing identity.
#[derive(Debug, Clone, Default)]
pub struct ListingStateStore {
    listings: Arc<RwLock<HashMap<ListingKey, Arc<ListingEntry>>>>,
}

impl ListingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for a listing, creating it on first observation.
    ///
    /// An existing entry keeps its original identity and context.
    pub async fn register(
        &self,
        identity: ListingIdentity,
        context: ListingContext,
    ) -> Arc<ListingEntry> {
        let key = identity.key();
        if let Some(entry) = self.listings.read().await.get(&key) {
            return entry.clone();
        }

        let mut listings = self.listings.write().await;
        listings
            .entry(key)
            .or_insert_with(|| Arc::new(ListingEntry::new(identity, context)))
            .clone()
    }

    pub async fn entry(&self, key: &ListingKey) -> Option<Arc<ListingEntry>> {
        self.listings.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self, key: &ListingKey) -> Option<ListingState> {
        let entry = self.entry(key).await?;
        Some(entry.snapshot().await)
    }

    pub async fn keys(&self) -> Vec<ListingKey> {
        self.listings.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.listings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listings.read().await.is_empty()
    }
}
