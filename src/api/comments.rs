//! Comment procedures.

use axum::extract::State;

use super::{success, ApiResult, RpcInput};
use crate::errors::AppError;
use crate::models::{is_valid_comment_content, Comment, CreateCommentInput, GetCommentsInput};
use crate::AppState;

/// POST /api/rpc/getComments - All comments of a post, oldest first.
pub async fn get_comments(
    State(state): State<AppState>,
    RpcInput(input): RpcInput<GetCommentsInput>,
) -> ApiResult<Vec<Comment>> {
    let comments = state.repo.get_comments(input.post_id).await?;
    success(comments)
}

/// POST /api/rpc/createComment - Create a comment on a post.
pub async fn create_comment(
    State(state): State<AppState>,
    RpcInput(input): RpcInput<CreateCommentInput>,
) -> ApiResult<Comment> {
    if !is_valid_comment_content(&input.content) {
        return Err(AppError::Validation("Comment content is required".to_string()));
    }

    let comment = state
        .repo
        .create_comment(input.post_id, &input.content)
        .await?;
    tracing::info!("Created comment {} on post {}", comment.id, comment.post_id);

    success(comment)
}
