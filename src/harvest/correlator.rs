//! Response correlation and batch ingestion.
//!
//! Intercepted responses are matched to a listing by the shape of their
//! query string, parsed, and pushed through the dedup filter. Embedded page
//! data enters through the same [`ResponseCorrelator::ingest`] path, so both
//! sources share one writer per listing.

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::dedup::filter_new;
use super::enqueue::TaskEnqueuer;
use super::parser;
use super::sink::OutputSink;
use super::state::{ListingEntry, ListingState, ListingStateStore};
use crate::error::{HarvestError, Result};
use crate::models::{
    post_url, BatchMeta, FormattedRecord, ListingIdentity, ListingKind, SnapshotSource, Timeline,
};

/// Query variable every paginated request carries.
const PAGINATION_MARKER: &str = "\"first\"";

/// What a single ingested timeline did to its listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Items in the parsed timeline.
    pub received: usize,
    /// Ids added to the emitted set (enqueued ids included).
    pub newly_emitted: usize,
    pub position_offset: usize,
    /// Effective has-more after the sticky-false reconcile.
    pub has_next_page: bool,
    pub needs_enqueue: bool,
}

/// Whether a response URL looks like a pagination query for `kind`.
///
/// Both the kind's owner variable and the page-size marker must appear in
/// the (percent-decoded) URL.
pub fn matches_signature(kind: ListingKind, url: &str) -> bool {
    let decoded = urlencoding::decode(url).unwrap_or(Cow::Borrowed(url));
    let variable = format!("\"{}\"", kind.checked_variable());
    decoded.contains(PAGINATION_MARKER) && decoded.contains(&variable)
}

pub struct ResponseCorrelator {
    store: ListingStateStore,
    sink: Arc<dyn OutputSink>,
    enqueuer: Option<Arc<dyn TaskEnqueuer>>,
}

impl ResponseCorrelator {
    pub fn new(store: ListingStateStore, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            store,
            sink,
            enqueuer: None,
        }
    }

    pub fn with_enqueuer(mut self, enqueuer: Arc<dyn TaskEnqueuer>) -> Self {
        self.enqueuer = Some(enqueuer);
        self
    }

    pub fn store(&self) -> &ListingStateStore {
        &self.store
    }

    /// Handle one intercepted response for `identity`.
    ///
    /// Unrelated URLs, non-2xx statuses, unparseable bodies and bodies
    /// without this kind's listing data are ignored and return `Ok(None)`.
    /// Such a response leaves the listing untouched. Errors only come from
    /// the sink or enqueuer.
    pub async fn on_response(
        &self,
        identity: &ListingIdentity,
        url: &str,
        status: u16,
        body: &str,
    ) -> Result<Option<BatchOutcome>> {
        if !matches_signature(identity.kind, url) {
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            debug!("[{}] Ignoring response with status {}: {}", identity, status, url);
            return Ok(None);
        }

        let json: Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(e) => {
                debug!("[{}] Ignoring malformed response body: {}", identity, e);
                return Ok(None);
            }
        };
        let data = json.get("data").unwrap_or(&json);
        let Some(timeline) = parser::try_parse(identity.kind, data) else {
            debug!(
                "[{}] Ignoring response without {} data: {}",
                identity, identity.kind, url
            );
            return Ok(None);
        };

        self.ingest(identity, timeline, SnapshotSource::Response)
            .await
            .map(Some)
    }

    /// Feed a parsed timeline into the listing's state and forward new items.
    ///
    /// The listing's lock is held until the sink call returns, so records of
    /// one listing reach the sink in position order.
    pub async fn ingest(
        &self,
        identity: &ListingIdentity,
        timeline: Timeline,
        source: SnapshotSource,
    ) -> Result<BatchOutcome> {
        let entry = self
            .store
            .entry(&identity.key())
            .await
            .ok_or_else(|| HarvestError::UnknownListing(identity.to_string()))?;

        let outcome = {
            let mut state = entry.lock().await;
            if let Some(total) = timeline.total_count_hint {
                state.total_count_hint = Some(total);
            }
            let has_next_page = state.reconcile_has_next_page(timeline.has_next_page);

            if timeline.needs_enqueue {
                state.needs_enqueue = true;
                self.enqueue_items(&entry, &mut state, timeline, has_next_page)
                    .await?
            } else {
                self.emit_items(&entry, &mut state, timeline, has_next_page, source)
                    .await?
            }
        };

        entry.mark_first_data();
        Ok(outcome)
    }

    async fn emit_items(
        &self,
        entry: &ListingEntry,
        state: &mut ListingState,
        timeline: Timeline,
        has_next_page: bool,
        source: SnapshotSource,
    ) -> Result<BatchOutcome> {
        let identity = entry.identity();
        let received = timeline.items.len();
        let filtered = filter_new(state, identity.limit, timeline.items);

        let label = identity.kind.label();
        info!(
            "[{}] {} {}s loaded, {}/{} {}s scraped",
            identity,
            received,
            label,
            state.emitted_count(),
            state
                .total_count_hint
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string()),
            label
        );

        if !filtered.ready.is_empty() {
            let records: Vec<FormattedRecord> = filtered
                .ready
                .iter()
                .map(|p| {
                    FormattedRecord::format(
                        identity,
                        entry.context(),
                        &p.item,
                        p.id.clone(),
                        p.position,
                    )
                })
                .collect();
            let meta = BatchMeta {
                label: label.to_string(),
                position_offset: filtered.position_offset,
                listing: identity.to_string(),
                source,
            };
            self.sink.emit(records, meta).await?;
        }

        Ok(BatchOutcome {
            received,
            newly_emitted: filtered.newly_emitted,
            position_offset: filtered.position_offset,
            has_next_page,
            needs_enqueue: false,
        })
    }

    async fn enqueue_items(
        &self,
        entry: &ListingEntry,
        state: &mut ListingState,
        timeline: Timeline,
        has_next_page: bool,
    ) -> Result<BatchOutcome> {
        let identity = entry.identity();
        let position_offset = state.emitted_count();
        if timeline.items.is_empty() {
            state.record_batch(0);
            return Ok(BatchOutcome {
                position_offset,
                has_next_page,
                needs_enqueue: true,
                ..Default::default()
            });
        }

        let enqueuer = self.enqueuer.as_ref().ok_or_else(|| {
            HarvestError::Enqueue(format!("[{}] no task enqueuer configured", identity))
        })?;

        let received = timeline.items.len();
        debug!("[{}] Needs enqueue, {} items", identity, received);

        let mut enqueued = 0;
        for item in &timeline.items {
            if state.emitted_count() >= identity.limit {
                break;
            }
            let (Some(id), Some(code)) = (item.id(), item.shortcode()) else {
                continue;
            };
            let outcome = enqueuer.enqueue(&post_url(&code)).await?;
            if !outcome.was_already_present {
                enqueued += 1;
            }
            state.insert_id(id);
        }

        let newly_emitted = state.emitted_count() - position_offset;
        state.record_batch(newly_emitted);

        if enqueued > 0 {
            info!("[{}] Got {} posts", identity, enqueued);
        }

        Ok(BatchOutcome {
            received,
            newly_emitted,
            position_offset,
            has_next_page,
            needs_enqueue: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::enqueue::MemoryTaskQueue;
    use crate::harvest::sink::ChannelSink;
    use crate::models::ListingContext;
    use serde_json::json;

    const PROFILE_URL: &str = "https://www.instagram.com/graphql/query/?query_hash=abc&variables=%7B%22id%22%3A%221%22%2C%22first%22%3A12%2C%22after%22%3A%22QVF%22%7D";

    fn profile_body(ids: &[&str], has_next: bool) -> String {
        let edges: Vec<Value> = ids
            .iter()
            .map(|id| json!({"node": {"id": id, "shortcode": format!("S{}", id)}}))
            .collect();
        json!({"data": {"user": {"edge_owner_to_timeline_media": {
            "count": 40,
            "page_info": {"has_next_page": has_next},
            "edges": edges
        }}}})
        .to_string()
    }

    async fn setup(
        identity: &ListingIdentity,
    ) -> (
        ResponseCorrelator,
        tokio::sync::mpsc::UnboundedReceiver<crate::harvest::sink::EmittedBatch>,
    ) {
        let store = ListingStateStore::new();
        store
            .register(identity.clone(), ListingContext::default())
            .await;
        let (sink, rx) = ChannelSink::new();
        (ResponseCorrelator::new(store, Arc::new(sink)), rx)
    }

    #[test]
    fn test_signature_matching() {
        assert!(matches_signature(ListingKind::ProfilePosts, PROFILE_URL));
        assert!(!matches_signature(ListingKind::PostComments, PROFILE_URL));
        assert!(!matches_signature(
            ListingKind::ProfilePosts,
            "https://www.instagram.com/graphql/query/?variables=%7B%22id%22%3A%221%22%7D"
        ));
        assert!(matches_signature(
            ListingKind::HashtagPosts,
            "https://x/graphql?variables={\"tag_name\":\"rust\",\"first\":9}"
        ));
    }

    #[tokio::test]
    async fn test_unrelated_and_failed_responses_are_ignored() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 100);
        let (correlator, mut rx) = setup(&identity).await;

        let body = profile_body(&["a"], true);
        assert_eq!(
            correlator
                .on_response(&identity, "https://x/other", 200, &body)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            correlator
                .on_response(&identity, PROFILE_URL, 500, &body)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            correlator
                .on_response(&identity, PROFILE_URL, 200, "<html>")
                .await
                .unwrap(),
            None
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_response_batches_are_deduplicated() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 100);
        let (correlator, mut rx) = setup(&identity).await;

        correlator
            .on_response(&identity, PROFILE_URL, 200, &profile_body(&["a", "b"], true))
            .await
            .unwrap();
        let outcome = correlator
            .on_response(&identity, PROFILE_URL, 200, &profile_body(&["b", "c"], true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.received, 2);
        assert_eq!(outcome.newly_emitted, 1);
        assert_eq!(outcome.position_offset, 2);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].position(), 3);
        assert_eq!(second.meta.position_offset, 2);
        assert_eq!(second.meta.label, "post");

        let state = correlator.store().snapshot(&identity.key()).await.unwrap();
        assert_eq!(state.total_count_hint, Some(40));
    }

    #[tokio::test]
    async fn test_has_next_page_stays_false() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 100);
        let (correlator, _rx) = setup(&identity).await;

        correlator
            .on_response(&identity, PROFILE_URL, 200, &profile_body(&["a"], false))
            .await
            .unwrap();
        let outcome = correlator
            .on_response(&identity, PROFILE_URL, 200, &profile_body(&["b"], true))
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.has_next_page);
    }

    #[tokio::test]
    async fn test_unregistered_listing() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 100);
        let (sink, _rx) = ChannelSink::new();
        let correlator = ResponseCorrelator::new(ListingStateStore::new(), Arc::new(sink));

        let err = correlator
            .ingest(&identity, Timeline::empty(), SnapshotSource::Embedded)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::UnknownListing(_)));
    }

    #[tokio::test]
    async fn test_enqueue_timeline_goes_to_queue() {
        let identity = ListingIdentity::new(ListingKind::PlacePosts, "31", 3);
        let (correlator, mut rx) = setup(&identity).await;
        let queue = MemoryTaskQueue::new();
        let correlator = correlator.with_enqueuer(Arc::new(queue.clone()));

        let timeline = Timeline {
            items: ["1", "2", "3", "4"]
                .iter()
                .map(|id| json!({"pk": id, "code": format!("C{}", id)}).into())
                .collect(),
            total_count_hint: None,
            has_next_page: false,
            needs_enqueue: true,
        };
        let outcome = correlator
            .ingest(&identity, timeline, SnapshotSource::Embedded)
            .await
            .unwrap();

        assert!(outcome.needs_enqueue);
        assert_eq!(outcome.newly_emitted, 3);
        assert_eq!(
            queue.urls().await,
            vec![
                "https://www.instagram.com/p/C1".to_string(),
                "https://www.instagram.com/p/C2".to_string(),
                "https://www.instagram.com/p/C3".to_string(),
            ]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unrecognized_body_leaves_listing_untouched() {
        let identity = ListingIdentity::new(ListingKind::ProfilePosts, "1", 100);
        let (correlator, mut rx) = setup(&identity).await;

        for body in [r#"{"status":"fail"}"#, r#"{"data":{"user":null}}"#] {
            assert_eq!(
                correlator
                    .on_response(&identity, PROFILE_URL, 200, body)
                    .await
                    .unwrap(),
                None
            );
        }

        let entry = correlator.store().entry(&identity.key()).await.unwrap();
        assert!(!entry.has_first_data());
        let state = entry.snapshot().await;
        assert_eq!(state.has_next_page(), None);
        assert_eq!(state.batches, 0);
        assert_eq!(state.no_new_items_streak, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_enqueue_timeline_needs_no_enqueuer() {
        let identity = ListingIdentity::new(ListingKind::PlacePosts, "31", 3);
        let (correlator, _rx) = setup(&identity).await;
        let timeline = Timeline {
            needs_enqueue: true,
            ..Timeline::empty()
        };
        let outcome = correlator
            .ingest(&identity, timeline, SnapshotSource::Embedded)
            .await
            .unwrap();
        assert!(outcome.needs_enqueue);
        assert_eq!(outcome.received, 0);
    }

    #[tokio::test]
    async fn test_enqueue_without_enqueuer_fails() {
        let identity = ListingIdentity::new(ListingKind::PlacePosts, "31", 3);
        let (correlator, _rx) = setup(&identity).await;
        let timeline = Timeline {
            items: vec![json!({"pk": "1", "code": "C1"}).into()],
            needs_enqueue: true,
            ..Timeline::empty()
        };
        let err = correlator
            .ingest(&identity, timeline, SnapshotSource::Embedded)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Enqueue(_)));
    }
}
