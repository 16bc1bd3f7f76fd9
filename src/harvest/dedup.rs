//! Deduplication and position assignment.

use crate::models::RawItem;

use super::state::ListingState;

/// An item that passed the filter, with its 1-based listing position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedItem {
    pub id: String,
    pub position: usize,
    pub item: RawItem,
}

/// Result of filtering one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredBatch {
    pub ready: Vec<PositionedItem>,
    /// Emitted-id count before this batch.
    pub position_offset: usize,
    pub newly_emitted: usize,
}

/// Keep only items whose id has not been emitted yet, in input order.
///
/// Positions continue from the number of ids already emitted, so they stay
/// gap-free across batches however many duplicates are dropped. Items
/// without an id are skipped. Once `limit` ids have been emitted the rest of
/// the batch is dropped.
pub fn filter_new(state: &mut ListingState, limit: usize, items: Vec<RawItem>) -> FilteredBatch {
    let position_offset = state.emitted_count();
    let mut ready = Vec::new();

    for item in items {
        if state.emitted_count() >= limit {
            break;
        }
        let id = match item.id() {
            Some(id) => id,
            None => continue,
        };
        if !state.insert_id(id.clone()) {
            continue;
        }
        ready.push(PositionedItem {
            id,
            position: position_offset + ready.len() + 1,
            item,
        });
    }

    let newly_emitted = ready.len();
    state.record_batch(newly_emitted);

    if let Some(ts) = ready.last().and_then(|p| p.item.timestamp()) {
        state.last_emitted_timestamp = Some(ts);
    }

    FilteredBatch {
        ready,
        position_offset,
        newly_emitted,
    }
}
