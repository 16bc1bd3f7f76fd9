//! Pagination coordination and deduplication for infinite-scroll listings.
//!
//! A [`HarvestSession`] owns the listing state. For each listing it runs a
//! [`PaginationCoordinator`] that drives the page, while a
//! [`ResponseCorrelator`] ingests intercepted responses from the feed.
//! Both push batches through the same dedup filter into an [`OutputSink`].

mod coordinator;
mod correlator;
mod dedup;
mod driver;
mod enqueue;
pub mod parser;
mod policy;
mod replay;
mod session;
mod sink;
mod state;

pub use coordinator::{CoordinatorPhase, EntryMode, ListingReport, PaginationCoordinator};
pub use correlator::{matches_signature, BatchOutcome, ResponseCorrelator};
pub use dedup::{filter_new, FilteredBatch, PositionedItem};
pub use driver::{response_channel, InterceptedResponse, PageDriver, ResponseFeed, ResponseSender};
pub use enqueue::{EnqueueOutcome, MemoryTaskQueue, TaskEnqueuer};
pub use parser::{parse, parse_embedded, try_parse, TimelineParser};
pub use policy::{Continuation, ContinuationPolicy, StopReason};
pub use replay::{RecordedResponse, RecordedSession, ReplayDriver};
pub use session::{HarvestSession, ListingRun};
pub use sink::{ChannelSink, EmittedBatch, JsonLinesSink, OutputSink};
pub use state::{ListingEntry, ListingState, ListingStateStore};
