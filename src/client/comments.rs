//! Per-post comment panel.
//!
//! A panel is the mounted view of one post's comments. It only holds what it last read from
//! the [`FeedCache`]; the cache stays the source of truth for lists and counts, so a panel can be
//! dropped and remounted without losing or duplicating anything.

use tracing::debug;

use super::{CachedComment, ClientError, FeedCache, PendingComment};
use crate::models::{Comment, PostId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelState {
    Collapsed,
    Loading,
    Loaded,
    Failed(ClientError),
}

#[derive(Debug)]
pub struct CommentPanel {
    post_id: PostId,
    state: PanelState,
    comments: Vec<CachedComment>,
    draft: String,
}

impl CommentPanel {
    pub fn new(post_id: PostId) -> Self {
        Self {
            post_id,
            state: PanelState::Collapsed,
            comments: Vec::new(),
            draft: String::new(),
        }
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn is_expanded(&self) -> bool {
        !matches!(self.state, PanelState::Collapsed)
    }

    pub fn comments(&self) -> &[CachedComment] {
        &self.comments
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Open the panel and load its comments, from the cache when they are fresh.
    pub async fn expand(&mut self, cache: &FeedCache) -> Result<(), ClientError> {
        self.state = PanelState::Loading;
        match cache.comments(self.post_id, false).await {
            Ok(comments) => {
                self.comments = comments;
                self.state = PanelState::Loaded;
                Ok(())
            }
            Err(e) => {
                debug!("Comments of post {} failed to load: {}", self.post_id, e);
                self.state = PanelState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Close the panel. The draft is kept.
    pub fn collapse(&mut self) {
        self.state = PanelState::Collapsed;
        self.comments.clear();
    }

    /// Flip between collapsed and expanded. Returns whether the panel is now expanded.
    /// Toggling a panel that failed to load tries the load again.
    pub async fn toggle(&mut self, cache: &FeedCache) -> Result<bool, ClientError> {
        match self.state {
            PanelState::Collapsed | PanelState::Failed(_) => {
                self.expand(cache).await?;
                Ok(true)
            }
            PanelState::Loading | PanelState::Loaded => {
                self.collapse();
                Ok(false)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state == PanelState::Loaded
    }

    /// Display count for the panel's post.
    pub fn comment_count(&self, cache: &FeedCache) -> i64 {
        cache.comment_count(self.post_id)
    }

    fn refresh(&mut self, cache: &FeedCache) {
        if self.is_expanded() {
            if let Some(view) = cache.cached_comments(self.post_id) {
                self.comments = view;
            }
        }
    }

    /// Apply the draft optimistically. The provisional entry is visible right away.
    pub fn begin_submit(&mut self, cache: &FeedCache) -> Result<PendingComment, ClientError> {
        let pending = cache.begin_comment(self.post_id, &self.draft)?;
        self.refresh(cache);
        Ok(pending)
    }

    /// Settle a pending comment. The draft is cleared on success and kept for retry on failure.
    pub async fn finish_submit(
        &mut self,
        cache: &FeedCache,
        pending: PendingComment,
    ) -> Result<Comment, ClientError> {
        let result = cache.settle_comment(pending).await;
        if result.is_ok() {
            self.draft.clear();
        }
        self.refresh(cache);
        result
    }

    /// Submit the current draft.
    pub async fn submit(&mut self, cache: &FeedCache) -> Result<Comment, ClientError> {
        let pending = self.begin_submit(cache)?;
        self.finish_submit(cache, pending).await
    }
}
