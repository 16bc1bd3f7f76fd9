//! Data models for scrollharvest.

mod listing;
mod record;
mod timeline;

pub use listing::{ListingContext, ListingIdentity, ListingKey, ListingKind};
pub use record::{
    post_url, BatchMeta, CommentRecord, DebugInfo, FormattedRecord, PostDetails, PostRecord,
};
pub use timeline::{EmbeddedData, RawItem, SnapshotSource, Timeline};
