//! Output records and batch metadata.
//!
//! Comments carry a fixed field set. Posts carry the listing-query echo
//! fields plus whatever the single-post formatter extracts from the node.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::listing::{ListingContext, ListingIdentity, ListingKind};
use super::timeline::{value_to_i64, value_to_string, RawItem, SnapshotSource};

const POST_URL_BASE: &str = "https://www.instagram.com/p/";

/// Build the post-detail URL for a short code.
pub fn post_url(shortcode: &str) -> String {
    format!("{}{}", POST_URL_BASE, shortcode)
}

/// Metadata passed to the output sink with every batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMeta {
    /// "comment" or "post".
    pub label: String,
    /// Number of items emitted for the listing before this batch.
    pub position_offset: usize,
    pub listing: String,
    pub source: SnapshotSource,
}

/// Positional and listing context attached to every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub index: usize,
    pub kind: Option<ListingKind>,
    pub owner_id: String,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_owner_id: Option<String>,
    #[serde(flatten)]
    pub user_data: Map<String, Value>,
}

impl DebugInfo {
    fn new(identity: &ListingIdentity, context: &ListingContext, position: usize) -> Self {
        Self {
            index: position,
            kind: Some(identity.kind),
            owner_id: identity.owner_id.clone(),
            limit: identity.limit,
            url: context.url.clone(),
            user_data: context.user_data.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    #[serde(rename = "#debug")]
    pub debug: DebugInfo,
    pub id: String,
    pub post_id: String,
    pub text: Option<String>,
    pub position: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
    pub owner_is_verified: Option<bool>,
    pub owner_username: Option<String>,
    pub owner_profile_pic_url: Option<String>,
}

/// Fields extracted from a single post node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetails {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub post_type: Option<String>,
    pub short_code: Option<String>,
    pub caption: Option<String>,
    pub url: Option<String>,
    pub comments_count: Option<i64>,
    pub likes_count: Option<i64>,
    pub display_url: Option<String>,
    pub alt: Option<String>,
    pub video_view_count: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub location_name: Option<String>,
    pub owner_id: Option<String>,
    pub owner_username: Option<String>,
}

impl PostDetails {
    /// Default single-post formatter.
    pub fn from_node(node: &Value) -> Self {
        let str_at = |path: &[&str]| -> Option<String> {
            let mut current = node;
            for key in path {
                current = current.get(*key)?;
            }
            value_to_string(current)
        };
        let int_at = |path: &[&str]| -> Option<i64> {
            let mut current = node;
            for key in path {
                current = current.get(*key)?;
            }
            value_to_i64(current)
        };

        let short_code = str_at(&["shortcode"]).or_else(|| str_at(&["code"]));
        let caption = node
            .pointer("/edge_media_to_caption/edges/0/node/text")
            .and_then(|v| v.as_str())
            .or_else(|| node.pointer("/caption/text").and_then(|v| v.as_str()))
            .map(|s| s.to_string());

        Self {
            id: str_at(&["id"]).or_else(|| str_at(&["pk"])),
            post_type: str_at(&["__typename"]),
            url: short_code.as_deref().map(post_url),
            short_code,
            caption,
            comments_count: int_at(&["edge_media_to_comment", "count"])
                .or_else(|| int_at(&["comment_count"])),
            likes_count: int_at(&["edge_media_preview_like", "count"])
                .or_else(|| int_at(&["edge_liked_by", "count"]))
                .or_else(|| int_at(&["like_count"])),
            display_url: str_at(&["display_url"]),
            alt: str_at(&["accessibility_caption"]),
            video_view_count: int_at(&["video_view_count"]),
            timestamp: int_at(&["taken_at_timestamp"])
                .or_else(|| int_at(&["taken_at"]))
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            location_name: str_at(&["location", "name"]),
            owner_id: str_at(&["owner", "id"]).or_else(|| str_at(&["user", "pk"])),
            owner_username: str_at(&["owner", "username"])
                .or_else(|| str_at(&["user", "username"])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "#debug")]
    pub debug: DebugInfo,
    pub query_tag: Option<String>,
    pub query_username: Option<String>,
    pub query_location: Option<String>,
    pub position: usize,
    #[serde(flatten)]
    pub details: PostDetails,
    #[serde(flatten)]
    pub user_data: Map<String, Value>,
}

/// A deduplicated, positioned record ready for the output sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormattedRecord {
    Comment(CommentRecord),
    Post(PostRecord),
}

impl FormattedRecord {
    /// Format a raw item at the given 1-based position.
    pub fn format(
        identity: &ListingIdentity,
        context: &ListingContext,
        item: &RawItem,
        id: String,
        position: usize,
    ) -> Self {
        if identity.kind.is_comments() {
            FormattedRecord::Comment(format_comment(identity, context, item, id, position))
        } else {
            FormattedRecord::Post(format_post(identity, context, item, position))
        }
    }

    pub fn position(&self) -> usize {
        match self {
            FormattedRecord::Comment(c) => c.position,
            FormattedRecord::Post(p) => p.position,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            FormattedRecord::Comment(c) => Some(c.id.as_str()),
            FormattedRecord::Post(p) => p.details.id.as_deref(),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FormattedRecord::Comment(c) => c.timestamp,
            FormattedRecord::Post(p) => p.details.timestamp,
        }
    }
}

fn format_comment(
    identity: &ListingIdentity,
    context: &ListingContext,
    item: &RawItem,
    id: String,
    position: usize,
) -> CommentRecord {
    let node = item.node();
    let owner = node.get("owner").filter(|o| o.is_object());
    let owner_str = |key: &str| owner.and_then(|o| o.get(key)).and_then(value_to_string);

    CommentRecord {
        debug: DebugInfo::new(identity, context, position),
        id,
        post_id: identity.owner_id.clone(),
        text: node.get("text").and_then(|v| v.as_str()).map(|s| s.to_string()),
        position,
        timestamp: item.timestamp(),
        owner_id: owner_str("id"),
        owner_is_verified: owner.and_then(|o| o.get("is_verified")).and_then(|v| v.as_bool()),
        owner_username: owner_str("username"),
        owner_profile_pic_url: owner_str("profile_pic_url"),
    }
}

fn format_post(
    identity: &ListingIdentity,
    context: &ListingContext,
    item: &RawItem,
    position: usize,
) -> PostRecord {
    let node = item.node();
    let mut debug = DebugInfo::new(identity, context, position);
    debug.shortcode = item.shortcode();
    debug.post_location_id = node
        .pointer("/location/id")
        .or_else(|| node.pointer("/location/pk"))
        .and_then(value_to_string);
    debug.post_owner_id = node
        .pointer("/owner/id")
        .or_else(|| node.pointer("/user/pk"))
        .and_then(value_to_string);

    PostRecord {
        debug,
        query_tag: context.tag_name.clone(),
        query_username: context.user_username.clone(),
        query_location: context.location_name.clone(),
        position,
        details: PostDetails::from_node(node),
        user_data: context.user_data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comment_record_fields() {
        let identity = ListingIdentity::new(ListingKind::PostComments, "CXyz", 50);
        let item = RawItem(json!({"node": {
            "id": "1799",
            "text": "nice",
            "created_at": 1600000000,
            "owner": {"id": "55", "is_verified": true, "username": "ana", "profile_pic_url": "https://x/y.jpg"}
        }}));

        let record = FormattedRecord::format(
            &identity,
            &ListingContext::default(),
            &item,
            "1799".to_string(),
            3,
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["id"], "1799");
        assert_eq!(value["postId"], "CXyz");
        assert_eq!(value["text"], "nice");
        assert_eq!(value["position"], 3);
        assert_eq!(value["timestamp"], "2020-09-13T12:26:40Z");
        assert_eq!(value["ownerIsVerified"], true);
        assert_eq!(value["ownerUsername"], "ana");
        assert_eq!(value["#debug"]["index"], 3);
    }

    #[test]
    fn test_comment_without_owner() {
        let identity = ListingIdentity::new(ListingKind::PostComments, "CXyz", 50);
        let item = RawItem(json!({"node": {"id": "1", "text": "x"}}));
        let record =
            FormattedRecord::format(&identity, &ListingContext::default(), &item, "1".into(), 1);
        match record {
            FormattedRecord::Comment(c) => {
                assert_eq!(c.owner_id, None);
                assert_eq!(c.owner_is_verified, None);
            }
            FormattedRecord::Post(_) => panic!("expected comment"),
        }
    }

    #[test]
    fn test_post_record_echoes_query() {
        let identity = ListingIdentity::new(ListingKind::HashtagPosts, "rust", 10);
        let mut context = ListingContext {
            tag_name: Some("rust".to_string()),
            ..Default::default()
        };
        context
            .user_data
            .insert("campaign".to_string(), json!("spring"));

        let item = RawItem(json!({"node": {
            "id": "900",
            "__typename": "GraphImage",
            "shortcode": "BQx",
            "taken_at_timestamp": 1600000000,
            "edge_media_to_caption": {"edges": [{"node": {"text": "hello"}}]},
            "edge_media_preview_like": {"count": 12},
            "owner": {"id": "77"},
            "location": {"id": "31", "name": "Prague"}
        }}));

        let record = FormattedRecord::format(&identity, &context, &item, "900".into(), 7);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["queryTag"], "rust");
        assert_eq!(value["queryUsername"], Value::Null);
        assert_eq!(value["position"], 7);
        assert_eq!(value["shortCode"], "BQx");
        assert_eq!(value["url"], "https://www.instagram.com/p/BQx");
        assert_eq!(value["caption"], "hello");
        assert_eq!(value["likesCount"], 12);
        assert_eq!(value["locationName"], "Prague");
        assert_eq!(value["campaign"], "spring");
        assert_eq!(value["#debug"]["shortcode"], "BQx");
        assert_eq!(value["#debug"]["postLocationId"], "31");
        assert_eq!(value["#debug"]["postOwnerId"], "77");
        assert_eq!(record.position(), 7);
        assert_eq!(record.id(), Some("900"));
    }
}
