//! In-memory transport for client tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{ClientError, FeedTransport};
use crate::models::{
    is_valid_comment_content, Comment, CreateCommentInput, ListPostsInput, Page, Post, PostId,
    PostSummary, UNKNOWN_AUTHOR,
};

#[derive(Default)]
struct MemoryState {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    next_comment_id: i64,
}

/// Serves `posts` published posts with ids `1..=posts`, paging the way the server does.
#[derive(Default)]
pub(crate) struct MemoryTransport {
    state: Mutex<MemoryState>,
    list_calls: AtomicUsize,
    comment_calls: AtomicUsize,
    create_calls: AtomicUsize,
    list_delay: Mutex<Option<Duration>>,
    comment_delay: Mutex<Option<Duration>>,
    list_failures: Mutex<VecDeque<ClientError>>,
    comment_failures: Mutex<VecDeque<ClientError>>,
    create_failures: Mutex<VecDeque<ClientError>>,
}

impl MemoryTransport {
    pub fn with_posts(posts: i64) -> Arc<Self> {
        let transport = Self::default();
        {
            let mut state = transport.state.lock();
            state.next_comment_id = 1;
            state.posts = (1..=posts)
                .map(|id| Post {
                    id,
                    title: format!("post {}", id),
                    content: Some(format!("body of post {}", id)),
                    published: true,
                    author_id: None,
                    created_at: Utc::now(),
                })
                .collect();
        }
        Arc::new(transport)
    }

    /// Add a comment directly to the backing store.
    pub fn add_comment(&self, post_id: PostId, content: &str) -> Comment {
        let mut state = self.state.lock();
        let comment = Comment {
            id: state.next_comment_id,
            content: content.to_string(),
            post_id,
            created_at: Utc::now(),
        };
        state.next_comment_id += 1;
        state.comments.push(comment.clone());
        comment
    }

    pub fn stored_comments(&self, post_id: PostId) -> usize {
        self.state
            .lock()
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .count()
    }

    pub fn fail_list(&self, errors: impl IntoIterator<Item = ClientError>) {
        self.list_failures.lock().extend(errors);
    }

    pub fn fail_comments(&self, error: ClientError) {
        self.comment_failures.lock().push_back(error);
    }

    pub fn fail_create(&self, error: ClientError) {
        self.create_failures.lock().push_back(error);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock() = Some(delay);
    }

    /// Delay `get_comments` answers. The list is read before the delay, so a comment created
    /// meanwhile is missing from the answer.
    pub fn set_comment_delay(&self, delay: Duration) {
        *self.comment_delay.lock() = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn comment_calls(&self) -> usize {
        self.comment_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedTransport for MemoryTransport {
    async fn list_posts(&self, input: ListPostsInput) -> Result<Page<PostSummary>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.list_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.list_failures.lock().pop_front() {
            return Err(err);
        }

        let limit = input
            .effective_limit()
            .ok_or_else(|| ClientError::Validation("limit out of range".to_string()))?;

        let state = self.state.lock();
        if let Some(cursor) = input.cursor {
            if !state.posts.iter().any(|p| p.id == cursor) {
                return Err(ClientError::NotFound(format!("Cursor post {} not found", cursor)));
            }
        }

        let rows = state
            .posts
            .iter()
            .filter(|p| p.published && p.id > input.cursor.unwrap_or(0))
            .take(limit as usize)
            .map(|p| PostSummary {
                post: p.clone(),
                author_name: UNKNOWN_AUTHOR.to_string(),
                comment_count: state.comments.iter().filter(|c| c.post_id == p.id).count() as i64,
            })
            .collect();

        Ok(Page::from_rows(rows, limit, PostSummary::id))
    }

    async fn get_comments(&self, post_id: PostId) -> Result<Vec<Comment>, ClientError> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.comment_failures.lock().pop_front() {
            return Err(err);
        }

        let comments: Vec<Comment> = {
            let state = self.state.lock();
            if !state.posts.iter().any(|p| p.id == post_id) {
                return Err(ClientError::NotFound(format!("Post {} not found", post_id)));
            }
            state
                .comments
                .iter()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect()
        };

        let delay = *self.comment_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(comments)
    }

    async fn create_comment(&self, input: CreateCommentInput) -> Result<Comment, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.create_failures.lock().pop_front() {
            return Err(err);
        }
        if !is_valid_comment_content(&input.content) {
            return Err(ClientError::Validation("Comment content is required".to_string()));
        }
        if !self.state.lock().posts.iter().any(|p| p.id == input.post_id) {
            return Err(ClientError::NotFound(format!("Post {} not found", input.post_id)));
        }

        Ok(self.add_comment(input.post_id, &input.content))
    }
}
