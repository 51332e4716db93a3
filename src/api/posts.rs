//! Post listing procedures.

use axum::extract::State;

use super::{success, ApiResult, RpcInput};
use crate::errors::AppError;
use crate::models::{ListPostsInput, Page, Post, PostSummary, MAX_PAGE_LIMIT};
use crate::AppState;

fn validated_limit(input: &ListPostsInput) -> Result<i64, AppError> {
    input.effective_limit().ok_or_else(|| {
        AppError::Validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_PAGE_LIMIT,
            input.limit.unwrap_or_default()
        ))
    })
}

/// POST /api/rpc/listPosts - One page of published posts.
pub async fn list_posts(
    State(state): State<AppState>,
    RpcInput(input): RpcInput<ListPostsInput>,
) -> ApiResult<Page<Post>> {
    let limit = validated_limit(&input)?;
    let page = state.repo.list_posts(input.cursor, limit).await?;

    tracing::debug!(
        cursor = ?input.cursor,
        limit,
        returned = page.posts.len(),
        "listPosts"
    );

    success(page)
}

/// POST /api/rpc/listPostsWithCommentCounts - One page of published posts with author
/// names and comment counts.
pub async fn list_posts_with_comment_counts(
    State(state): State<AppState>,
    RpcInput(input): RpcInput<ListPostsInput>,
) -> ApiResult<Page<PostSummary>> {
    let limit = validated_limit(&input)?;
    let page = state.repo.list_post_summaries(input.cursor, limit).await?;

    tracing::debug!(
        cursor = ?input.cursor,
        limit,
        returned = page.posts.len(),
        "listPostsWithCommentCounts"
    );

    success(page)
}
