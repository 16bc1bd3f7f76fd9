//! Listing snapshot parsing.
//!
//! Each listing kind has its own parser. Parsers never fail: a blob that
//! matches none of the known shapes yields `None` from [`try_parse`], and an
//! empty timeline with `has_next_page = false` from [`parse`].

use serde_json::{json, Value};

use crate::models::{EmbeddedData, ListingKind, RawItem, Timeline};

/// Turns a raw data blob into a [`Timeline`] for one listing kind.
pub trait TimelineParser: Send + Sync {
    /// Parse a GraphQL-shaped payload (an intercepted response's `data`,
    /// or the graphql object located inside embedded data). `None` when
    /// neither the primary nor the fallback shape is present.
    fn try_parse(&self, data: &Value) -> Option<Timeline>;

    fn parse(&self, data: &Value) -> Timeline {
        self.try_parse(data).unwrap_or_default()
    }

    /// Locate this kind's payload inside embedded page data.
    fn locate_embedded(&self, embedded: &EmbeddedData) -> Option<Value>;
}

impl ListingKind {
    pub fn parser(&self) -> &'static dyn TimelineParser {
        match self {
            ListingKind::PostComments => &CommentsParser,
            ListingKind::ProfilePosts => &ProfilePostsParser,
            ListingKind::HashtagPosts => &HashtagPostsParser,
            ListingKind::PlacePosts => &PlacePostsParser,
        }
    }
}

/// Parse a GraphQL-shaped payload for `kind`.
pub fn parse(kind: ListingKind, data: &Value) -> Timeline {
    kind.parser().parse(data)
}

/// Like [`parse`], but tells an unrecognized payload apart from an empty listing.
pub fn try_parse(kind: ListingKind, data: &Value) -> Option<Timeline> {
    kind.parser().try_parse(data)
}

/// Parse embedded page data for `kind`. `None` when the page carries no
/// data for this kind.
pub fn parse_embedded(kind: ListingKind, embedded: &EmbeddedData) -> Option<Timeline> {
    let parser = kind.parser();
    parser
        .locate_embedded(embedded)
        .and_then(|data| parser.try_parse(&data))
}

/// Comments under a post. The source lists newest first; output is oldest first.
pub struct CommentsParser;

impl TimelineParser for CommentsParser {
    fn try_parse(&self, data: &Value) -> Option<Timeline> {
        let timeline = data
            .pointer("/data/shortcode_media")
            .or_else(|| data.get("shortcode_media"))?
            .get("edge_media_to_parent_comment")
            .filter(|t| t.is_object())?;

        let mut items = edges(timeline);
        items.reverse();

        Some(Timeline {
            items,
            total_count_hint: timeline.get("count").and_then(|c| c.as_u64()),
            has_next_page: has_next_page(timeline),
            needs_enqueue: false,
        })
    }

    fn locate_embedded(&self, embedded: &EmbeddedData) -> Option<Value> {
        embedded
            .entry_data
            .pointer("/PostPage/0/graphql")
            .filter(|v| v.is_object())
            .or_else(|| {
                embedded
                    .additional_data
                    .as_ref()
                    .and_then(|d| d.get("graphql"))
                    .filter(|v| v.is_object())
            })
            .cloned()
    }
}

pub struct ProfilePostsParser;

impl TimelineParser for ProfilePostsParser {
    fn try_parse(&self, data: &Value) -> Option<Timeline> {
        data.pointer("/user/edge_owner_to_timeline_media")
            .filter(|t| t.is_object())
            .map(|t| post_timeline(t, data))
    }

    fn locate_embedded(&self, embedded: &EmbeddedData) -> Option<Value> {
        embedded
            .entry_data
            .pointer("/ProfilePage/0/graphql")
            .filter(|v| v.is_object())
            .cloned()
    }
}

pub struct HashtagPostsParser;

impl TimelineParser for HashtagPostsParser {
    fn try_parse(&self, data: &Value) -> Option<Timeline> {
        match data.pointer("/hashtag/edge_hashtag_to_media") {
            Some(t) if t.is_object() => Some(post_timeline(t, data)),
            _ => section_timeline(data),
        }
    }

    fn locate_embedded(&self, embedded: &EmbeddedData) -> Option<Value> {
        let entry = &embedded.entry_data;
        if let Some(graphql) = entry.pointer("/TagPage/0/graphql").filter(|v| v.is_object()) {
            return Some(graphql.clone());
        }

        let sections = collect_sections(&[
            entry.pointer("/recent/sections"),
            entry.pointer("/top/sections"),
        ]);
        Some(json!({ "sections": sections, "needsEnqueue": true }))
    }
}

pub struct PlacePostsParser;

impl TimelineParser for PlacePostsParser {
    fn try_parse(&self, data: &Value) -> Option<Timeline> {
        match data.pointer("/location/edge_location_to_media") {
            Some(t) if t.is_object() => Some(post_timeline(t, data)),
            _ => section_timeline(data),
        }
    }

    fn locate_embedded(&self, embedded: &EmbeddedData) -> Option<Value> {
        let entry = &embedded.entry_data;
        if let Some(graphql) = entry
            .pointer("/LocationsPage/0/graphql")
            .filter(|v| v.is_object())
        {
            return Some(graphql.clone());
        }

        let sections = collect_sections(&[
            entry.get("sections"),
            entry.pointer("/LocationsPage/0/native_location_data/ranked/sections"),
            entry.pointer("/LocationsPage/0/native_location_data/recent/sections"),
        ]);
        Some(json!({ "sections": sections, "needsEnqueue": true }))
    }
}

fn edges(timeline: &Value) -> Vec<RawItem> {
    timeline
        .get("edges")
        .and_then(|e| e.as_array())
        .map(|arr| arr.iter().cloned().map(RawItem).collect())
        .unwrap_or_default()
}

fn has_next_page(timeline: &Value) -> bool {
    timeline
        .pointer("/page_info/has_next_page")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn needs_enqueue(data: &Value) -> bool {
    data.get("needsEnqueue")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn post_timeline(timeline: &Value, data: &Value) -> Timeline {
    let items = edges(timeline);
    let total_count_hint = timeline
        .get("count")
        .and_then(|c| c.as_u64())
        .or(Some(items.len() as u64));

    Timeline {
        items,
        total_count_hint,
        has_next_page: has_next_page(timeline),
        needs_enqueue: needs_enqueue(data),
    }
}

/// Fallback for section-based layouts: media from every `media_grid` section.
fn section_timeline(data: &Value) -> Option<Timeline> {
    let sections = data.get("sections").and_then(|s| s.as_array())?;

    let items: Vec<RawItem> = sections
        .iter()
        .filter(|s| s.get("layout_type").and_then(|t| t.as_str()) == Some("media_grid"))
        .filter_map(|s| s.pointer("/layout_content/medias").and_then(|m| m.as_array()))
        .flatten()
        .filter_map(|m| m.get("media").cloned())
        .map(RawItem)
        .collect();

    Some(Timeline {
        total_count_hint: Some(items.len() as u64),
        items,
        has_next_page: false,
        needs_enqueue: needs_enqueue(data),
    })
}

fn collect_sections(sources: &[Option<&Value>]) -> Vec<Value> {
    sources
        .iter()
        .flatten()
        .filter_map(|v| v.as_array())
        .flatten()
        .cloned()
        .collect()
}
