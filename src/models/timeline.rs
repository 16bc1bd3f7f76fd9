//! Parsed listing snapshots.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Data embedded in the initial page load.
    Embedded,
    /// An intercepted background response.
    Response,
}

/// Data embedded in the initial page load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedData {
    /// The page's `entry_data` object.
    #[serde(default)]
    pub entry_data: Value,
    /// Data the page attaches after the initial render, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Value>,
}

impl EmbeddedData {
    pub fn new(entry_data: Value) -> Self {
        Self {
            entry_data,
            additional_data: None,
        }
    }

    pub fn with_additional_data(mut self, data: Value) -> Self {
        self.additional_data = Some(data);
        self
    }
}

/// A raw record from a listing, opaque beyond its id and timestamp.
///
/// Wraps either a GraphQL edge (`{"node": {...}}`) or a bare media object
/// from a section-based layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(pub Value);

impl RawItem {
    /// The item's own fields, unwrapping a GraphQL edge.
    pub fn node(&self) -> &Value {
        match self.0.get("node") {
            Some(node) if node.is_object() => node,
            _ => &self.0,
        }
    }

    pub fn id(&self) -> Option<String> {
        let node = self.node();
        node.get("id")
            .or_else(|| node.get("pk"))
            .and_then(value_to_string)
    }

    /// Creation time, from whichever epoch-seconds field the shape carries.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let node = self.node();
        ["created_at", "taken_at_timestamp", "taken_at"]
            .iter()
            .find_map(|key| node.get(*key).and_then(value_to_i64))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Short code used to build the post-detail URL.
    pub fn shortcode(&self) -> Option<String> {
        let node = self.node();
        node.get("shortcode")
            .or_else(|| node.get("code"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for RawItem {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Ids and timestamps arrive as either strings or numbers.
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// One parsed snapshot of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub items: Vec<RawItem>,
    pub total_count_hint: Option<u64>,
    pub has_next_page: bool,
    /// Items are stubs that must be enqueued for a follow-up fetch.
    pub needs_enqueue: bool,
}

impl Timeline {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
