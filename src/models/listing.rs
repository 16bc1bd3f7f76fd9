//! Listing identity types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// The kind of paginated listing being harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingKind {
    /// Comments under a single post.
    PostComments,
    /// Posts on a user profile.
    ProfilePosts,
    /// Posts tagged with a hashtag.
    HashtagPosts,
    /// Posts at a place/location.
    PlacePosts,
}

impl ListingKind {
    pub const ALL: [ListingKind; 4] = [
        ListingKind::PostComments,
        ListingKind::ProfilePosts,
        ListingKind::HashtagPosts,
        ListingKind::PlacePosts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::PostComments => "post-comments",
            ListingKind::ProfilePosts => "profile-posts",
            ListingKind::HashtagPosts => "hashtag-posts",
            ListingKind::PlacePosts => "place-posts",
        }
    }

    /// Label attached to emitted batches.
    pub fn label(&self) -> &'static str {
        match self {
            ListingKind::PostComments => "comment",
            _ => "post",
        }
    }

    /// Query variable that must appear in a paginated request for this kind.
    pub fn checked_variable(&self) -> &'static str {
        match self {
            ListingKind::PostComments => "shortcode",
            ListingKind::ProfilePosts | ListingKind::PlacePosts => "id",
            ListingKind::HashtagPosts => "tag_name",
        }
    }

    pub fn is_comments(&self) -> bool {
        matches!(self, ListingKind::PostComments)
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingKind {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "post-comments" | "comments" => Ok(ListingKind::PostComments),
            "profile-posts" | "profile" => Ok(ListingKind::ProfilePosts),
            "hashtag-posts" | "hashtag" => Ok(ListingKind::HashtagPosts),
            "place-posts" | "place" | "location" => Ok(ListingKind::PlacePosts),
            other => Err(HarvestError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Key of the listing table: kind plus owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingKey {
    pub kind: ListingKind,
    pub owner_id: String,
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.owner_id)
    }
}

/// A logical paginated listing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingIdentity {
    pub kind: ListingKind,
    pub owner_id: String,
    /// Maximum number of items to emit.
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_wait_ms: Option<u64>,
    /// Stop once the last emitted item is older than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newer_than: Option<DateTime<Utc>>,
}

impl ListingIdentity {
    pub fn new(kind: ListingKind, owner_id: impl Into<String>, limit: usize) -> Self {
        Self {
            kind,
            owner_id: owner_id.into(),
            limit,
            scroll_wait_ms: None,
            newer_than: None,
        }
    }

    pub fn with_scroll_wait_ms(mut self, ms: u64) -> Self {
        self.scroll_wait_ms = Some(ms);
        self
    }

    pub fn with_newer_than(mut self, cutoff: DateTime<Utc>) -> Self {
        self.newer_than = Some(cutoff);
        self
    }

    pub fn key(&self) -> ListingKey {
        ListingKey {
            kind: self.kind,
            owner_id: self.owner_id.clone(),
        }
    }

    /// Settle delay after a drive step, falling back to `default`.
    pub fn settle_delay(&self, default: Duration) -> Duration {
        self.scroll_wait_ms
            .map(Duration::from_millis)
            .unwrap_or(default)
    }
}

impl fmt::Display for ListingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.owner_id)
    }
}

/// Caller-side context echoed into every formatted record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingContext {
    /// URL of the page being harvested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    /// Free-form data merged into post records and every debug block.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub user_data: serde_json::Map<String, serde_json::Value>,
}
