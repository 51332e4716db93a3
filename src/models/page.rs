//! Cursor pagination types.
//!
//! The cursor is the identifier of the last post the client has seen. Clients echo back the
//! exact `nextCursor` they received and stop once it is absent.

use serde::{Deserialize, Serialize};

use super::PostId;

/// Page size used when `limit` is omitted.
pub const DEFAULT_PAGE_LIMIT: i64 = 10;
/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Input of the `listPosts` family of procedures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<PostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl ListPostsInput {
    /// Resolve the requested limit, or `None` if it falls outside `1..=MAX_PAGE_LIMIT`.
    pub fn effective_limit(&self) -> Option<i64> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        (1..=MAX_PAGE_LIMIT).contains(&limit).then_some(limit)
    }
}

/// One bounded batch of posts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub posts: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<PostId>,
}

impl<T> Page<T> {
    /// Build a page, deriving `nextCursor` from whether the page came back full.
    pub fn from_rows(posts: Vec<T>, limit: i64, id_of: impl Fn(&T) -> PostId) -> Self {
        let next_cursor = if posts.len() as i64 == limit {
            posts.last().map(id_of)
        } else {
            None
        };
        Self { posts, next_cursor }
    }
}
