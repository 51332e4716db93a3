//! Post models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a post. Strictly increasing in creation order; doubles as the pagination cursor.
pub type PostId = i64;

/// Display name used when a post has no author or the author has no name.
pub const UNKNOWN_AUTHOR: &str = "Unknown author";

/// A post in the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A post together with its author's display name and the comment count at query time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
    pub comment_count: i64,
}

impl PostSummary {
    pub fn id(&self) -> PostId {
        self.post.id
    }
}

/// Insert payload for a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: Option<String>,
    pub published: bool,
    pub author_id: Option<i64>,
}
