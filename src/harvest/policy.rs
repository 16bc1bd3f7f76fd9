//! Continuation policy: the only authority on whether driving continues.

use std::fmt;

use super::state::{ListingState, ListingStateStore};
use crate::error::{HarvestError, Result};
use crate::models::ListingIdentity;

/// Why a listing stopped being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    LimitReached,
    NoNextPage,
    Stalled,
    ReachedCutoff,
    /// The listing only allows its initial batch (entry gating).
    InitialOnly,
    /// An enqueue listing whose first timeline had no items.
    Exhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::LimitReached => "limit reached",
            StopReason::NoNextPage => "no next page",
            StopReason::Stalled => "no new items",
            StopReason::ReachedCutoff => "reached date cutoff",
            StopReason::InitialOnly => "initial batch only",
            StopReason::Exhausted => "nothing to load",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Continue,
    Stop(StopReason),
}

impl Continuation {
    pub fn should_continue(&self) -> bool {
        matches!(self, Continuation::Continue)
    }
}

#[derive(Debug, Clone)]
pub struct ContinuationPolicy {
    store: ListingStateStore,
    stall_threshold: u32,
}

impl ContinuationPolicy {
    pub fn new(store: ListingStateStore, stall_threshold: u32) -> Self {
        Self {
            store,
            stall_threshold,
        }
    }

    pub fn stall_threshold(&self) -> u32 {
        self.stall_threshold
    }

    /// Decide from a state snapshot.
    ///
    /// Checks run in order: limit, date cutoff, has-more (ignored for
    /// enqueue listings), then the no-new-items streak.
    pub fn decide(&self, identity: &ListingIdentity, state: &ListingState) -> Continuation {
        if state.emitted_count() >= identity.limit {
            return Continuation::Stop(StopReason::LimitReached);
        }
        if let (Some(cutoff), Some(last)) = (identity.newer_than, state.last_emitted_timestamp) {
            if last < cutoff {
                return Continuation::Stop(StopReason::ReachedCutoff);
            }
        }
        if !state.needs_enqueue && state.has_next_page() == Some(false) {
            return Continuation::Stop(StopReason::NoNextPage);
        }
        if state.no_new_items_streak > self.stall_threshold {
            return Continuation::Stop(StopReason::Stalled);
        }
        Continuation::Continue
    }

    pub async fn evaluate(&self, identity: &ListingIdentity) -> Result<Continuation> {
        let entry = self
            .store
            .entry(&identity.key())
            .await
            .ok_or_else(|| HarvestError::UnknownListing(identity.to_string()))?;
        let state = entry.lock().await;
        Ok(self.decide(identity, &state))
    }

    /// False for unknown listings.
    pub async fn should_continue(&self, identity: &ListingIdentity) -> bool {
        self.evaluate(identity)
            .await
            .map(|c| c.should_continue())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::dedup::filter_new;
    use crate::models::{ListingContext, ListingKind, RawItem};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn items(ids: &[&str]) -> Vec<RawItem> {
        ids.iter()
            .map(|id| RawItem(json!({"node": {"id": id}})))
            .collect()
    }

    fn policy() -> ContinuationPolicy {
        ContinuationPolicy::new(ListingStateStore::new(), 3)
    }

    #[test]
    fn test_continues_before_first_data() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 10);
        assert_eq!(
            policy().decide(&identity, &ListingState::default()),
            Continuation::Continue
        );
    }

    #[test]
    fn test_limit() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 2);
        let mut state = ListingState::default();
        state.reconcile_has_next_page(true);
        filter_new(&mut state, 2, items(&["a", "b"]));
        assert_eq!(
            policy().decide(&identity, &state),
            Continuation::Stop(StopReason::LimitReached)
        );
    }

    #[test]
    fn test_sticky_no_next_page() {
        let identity = ListingIdentity::new(ListingKind::PostComments, "C", 100);
        let mut state = ListingState::default();
        state.reconcile_has_next_page(false);
        state.reconcile_has_next_page(true);
        assert_eq!(
            policy().decide(&identity, &state),
            Continuation::Stop(StopReason::NoNextPage)
        );
    }

    #[test]
    fn test_enqueue_listing_ignores_has_next_page() {
        let identity = ListingIdentity::new(ListingKind::PlacePosts, "31", 100);
        let mut state = ListingState::default();
        state.reconcile_has_next_page(false);
        state.needs_enqueue = true;
        assert_eq!(policy().decide(&identity, &state), Continuation::Continue);
    }

    #[test]
    fn test_stall_after_threshold() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 100);
        let policy = policy();
        let mut state = ListingState::default();
        state.reconcile_has_next_page(true);
        filter_new(&mut state, 100, items(&["a"]));

        for _ in 0..3 {
            filter_new(&mut state, 100, items(&["a"]));
            assert_eq!(policy.decide(&identity, &state), Continuation::Continue);
        }
        filter_new(&mut state, 100, items(&["a"]));
        assert_eq!(
            policy.decide(&identity, &state),
            Continuation::Stop(StopReason::Stalled)
        );
    }

    #[test]
    fn test_cutoff() {
        let cutoff = Utc.with_ymd_and_hms(2020, 9, 1, 0, 0, 0).unwrap();
        let identity =
            ListingIdentity::new(ListingKind::ProfilePosts, "1", 100).with_newer_than(cutoff);
        let mut state = ListingState::default();
        state.reconcile_has_next_page(true);

        state.last_emitted_timestamp = Some(Utc.with_ymd_and_hms(2020, 9, 5, 0, 0, 0).unwrap());
        assert_eq!(policy().decide(&identity, &state), Continuation::Continue);

        state.last_emitted_timestamp = Some(Utc.with_ymd_and_hms(2020, 8, 5, 0, 0, 0).unwrap());
        assert_eq!(
            policy().decide(&identity, &state),
            Continuation::Stop(StopReason::ReachedCutoff)
        );
    }

    #[tokio::test]
    async fn test_should_continue_unknown_listing() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 100);
        let policy = policy();
        assert!(!policy.should_continue(&identity).await);

        policy
            .store
            .register(identity.clone(), ListingContext::default())
            .await;
        assert!(policy.should_continue(&identity).await);
    }
}
