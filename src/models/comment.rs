//! Comment models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PostId;

/// A comment attached to a post. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: PostId,
    pub created_at: DateTime<Utc>,
}

/// Input of the `getComments` procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCommentsInput {
    pub post_id: PostId,
}

/// Input of the `createComment` procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    pub post_id: PostId,
    pub content: String,
}

/// True when the content has something other than whitespace.
pub fn is_valid_comment_content(content: &str) -> bool {
    !content.trim().is_empty()
}
