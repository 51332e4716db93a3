//! Client data cache.
//!
//! Two independently keyed stores live here:
//!
//! - pages of posts, keyed by page `limit`, appended one cursor step at a time with at most
//!   one request in flight per key;
//! - comment lists, keyed by post id, fetched lazily and trusted for a freshness window.
//!
//! Optimistic comments are kept apart from fetched lists until the server answers. A confirmed
//! comment replaces its provisional entry; a failed one is dropped. The cache is the only owner
//! of per-post comment counts, so a confirmation is never counted twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{with_retry, ClientError, FeedTransport, RetryPolicy};
use crate::models::{
    is_valid_comment_content, Comment, CreateCommentInput, ListPostsInput, Page, PostId,
    PostSummary,
};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched comment list is served without a refetch
    pub freshness: Duration,
    /// Retry policy for reads
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of [`FeedCache::fetch_next_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page was fetched and appended
    Appended { count: usize },
    /// Another fetch for the same key is outstanding; nothing was requested
    InFlight,
    /// The last page had no cursor; nothing was requested
    Exhausted,
}

/// Client-generated identifier of a comment the server has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(Uuid);

impl TempId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A comment shown before the server confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalComment {
    pub temp_id: TempId,
    pub post_id: PostId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of a post's displayed comment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedComment {
    Confirmed(Comment),
    Provisional(ProvisionalComment),
}

impl CachedComment {
    pub fn content(&self) -> &str {
        match self {
            CachedComment::Confirmed(c) => &c.content,
            CachedComment::Provisional(p) => &p.content,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, CachedComment::Provisional(_))
    }
}

/// Handle for an optimistic comment between [`FeedCache::begin_comment`] and
/// [`FeedCache::settle_comment`].
#[derive(Debug)]
pub struct PendingComment {
    temp_id: TempId,
    post_id: PostId,
    content: String,
}

impl PendingComment {
    pub fn temp_id(&self) -> TempId {
        self.temp_id
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }
}

#[derive(Debug, Default)]
struct PageSet {
    pages: Vec<Page<PostSummary>>,
    in_flight: bool,
    last_error: Option<ClientError>,
}

impl PageSet {
    fn next_cursor(&self) -> Option<PostId> {
        self.pages.last().and_then(|p| p.next_cursor)
    }

    fn exhausted(&self) -> bool {
        self.pages.last().is_some_and(|p| p.next_cursor.is_none())
    }
}

#[derive(Debug)]
struct CommentEntry {
    confirmed: Vec<Comment>,
    fetched_at: Instant,
    stale: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    pages: HashMap<i64, PageSet>,
    comments: HashMap<PostId, CommentEntry>,
    pending: HashMap<PostId, Vec<ProvisionalComment>>,
    /// Comment count reported with the post's page
    page_counts: HashMap<PostId, i64>,
    /// Comments confirmed while the post's list was not loaded
    confirmed_unloaded: HashMap<PostId, Vec<Comment>>,
    /// Bumped on every confirmed comment, so a fetch can tell it raced a mutation
    generations: HashMap<PostId, u64>,
}

impl CacheState {
    fn comment_view(&self, post_id: PostId) -> Option<Vec<CachedComment>> {
        let entry = self.comments.get(&post_id)?;
        let mut view: Vec<CachedComment> = entry
            .confirmed
            .iter()
            .cloned()
            .map(CachedComment::Confirmed)
            .collect();
        if let Some(pending) = self.pending.get(&post_id) {
            view.extend(pending.iter().cloned().map(CachedComment::Provisional));
        }
        Some(view)
    }

    fn generation(&self, post_id: PostId) -> u64 {
        self.generations.get(&post_id).copied().unwrap_or(0)
    }

    /// Store a fetched list. A list fetched while a comment was confirmed may predate that
    /// comment, so confirmed comments it lacks are kept and the entry stays stale.
    fn store_fetched(&mut self, post_id: PostId, mut fetched: Vec<Comment>, generation: u64) {
        let raced = self.generation(post_id) != generation;
        let unloaded = self.confirmed_unloaded.remove(&post_id).unwrap_or_default();

        if raced {
            tracing::debug!(
                "Comments of post {} changed during fetch, merging confirmed entries",
                post_id
            );
            let previous = self
                .comments
                .remove(&post_id)
                .map(|entry| entry.confirmed)
                .unwrap_or_default();
            for comment in previous.into_iter().chain(unloaded) {
                if !fetched.iter().any(|c| c.id == comment.id) {
                    fetched.push(comment);
                }
            }
            fetched.sort_by_key(|c| c.id);
        }

        self.comments.insert(
            post_id,
            CommentEntry {
                confirmed: fetched,
                fetched_at: Instant::now(),
                stale: raced,
            },
        );
    }

    fn remove_pending(&mut self, post_id: PostId, temp_id: TempId) {
        if let Some(list) = self.pending.get_mut(&post_id) {
            list.retain(|p| p.temp_id != temp_id);
            if list.is_empty() {
                self.pending.remove(&post_id);
            }
        }
    }
}

/// Clears the in-flight marker of a page key when the fetch ends, however it ends.
struct InFlightGuard<'a> {
    state: &'a Mutex<CacheState>,
    limit: i64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(set) = self.state.lock().pages.get_mut(&self.limit) {
            set.in_flight = false;
        }
    }
}

/// Query cache shared by every consumer of the feed.
pub struct FeedCache {
    transport: Arc<dyn FeedTransport>,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl FeedCache {
    pub fn new(transport: Arc<dyn FeedTransport>, config: CacheConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ==================== PAGES ====================

    /// All posts fetched so far for `limit`, pages flattened in order.
    pub fn posts(&self, limit: i64) -> Vec<PostSummary> {
        let state = self.state.lock();
        state
            .pages
            .get(&limit)
            .map(|set| set.pages.iter().flat_map(|p| p.posts.iter().cloned()).collect())
            .unwrap_or_default()
    }

    pub fn page_count(&self, limit: i64) -> usize {
        self.state
            .lock()
            .pages
            .get(&limit)
            .map_or(0, |set| set.pages.len())
    }

    /// False once a page came back without a cursor.
    pub fn has_next_page(&self, limit: i64) -> bool {
        !self
            .state
            .lock()
            .pages
            .get(&limit)
            .is_some_and(PageSet::exhausted)
    }

    pub fn is_fetching(&self, limit: i64) -> bool {
        self.state
            .lock()
            .pages
            .get(&limit)
            .is_some_and(|set| set.in_flight)
    }

    /// Error of the last page fetch for `limit`, cleared by the next success.
    pub fn last_error(&self, limit: i64) -> Option<ClientError> {
        self.state
            .lock()
            .pages
            .get(&limit)
            .and_then(|set| set.last_error.clone())
    }

    /// Fetch the page after the last cursor received for `limit`.
    pub async fn fetch_next_page(&self, limit: i64) -> Result<FetchOutcome, ClientError> {
        let cursor = {
            let mut state = self.state.lock();
            let set = state.pages.entry(limit).or_default();
            if set.exhausted() {
                return Ok(FetchOutcome::Exhausted);
            }
            if set.in_flight {
                tracing::debug!("Page fetch for limit {} already in flight", limit);
                return Ok(FetchOutcome::InFlight);
            }
            set.in_flight = true;
            set.next_cursor()
        };
        let _guard = InFlightGuard {
            state: &self.state,
            limit,
        };

        tracing::debug!("Fetching page after cursor {:?} (limit {})", cursor, limit);
        let input = ListPostsInput {
            cursor,
            limit: Some(limit),
        };
        let result = with_retry(&self.config.retry, || {
            self.transport.list_posts(input.clone())
        })
        .await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match result {
            Ok(page) => {
                let count = page.posts.len();
                for post in &page.posts {
                    state.page_counts.insert(post.id(), post.comment_count);
                }
                let set = state.pages.entry(limit).or_default();
                set.last_error = None;
                set.pages.push(page);
                Ok(FetchOutcome::Appended { count })
            }
            Err(e) => {
                tracing::warn!("Page fetch after cursor {:?} failed: {}", cursor, e);
                state.pages.entry(limit).or_default().last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    // ==================== COMMENTS ====================

    /// The post's displayed comment list, if it has been loaded.
    pub fn cached_comments(&self, post_id: PostId) -> Option<Vec<CachedComment>> {
        self.state.lock().comment_view(post_id)
    }

    /// Whether the post's list would be served without a request.
    pub fn is_fresh(&self, post_id: PostId) -> bool {
        self.state
            .lock()
            .comments
            .get(&post_id)
            .is_some_and(|entry| !entry.stale && entry.fetched_at.elapsed() < self.config.freshness)
    }

    /// Comments of a post. Served from the cache when fresh unless `force` is set.
    pub async fn comments(
        &self,
        post_id: PostId,
        force: bool,
    ) -> Result<Vec<CachedComment>, ClientError> {
        if !force && self.is_fresh(post_id) {
            if let Some(view) = self.cached_comments(post_id) {
                return Ok(view);
            }
        }

        tracing::debug!("Fetching comments of post {}", post_id);
        let generation = self.state.lock().generation(post_id);
        let fetched = with_retry(&self.config.retry, || self.transport.get_comments(post_id)).await?;

        let mut state = self.state.lock();
        state.store_fetched(post_id, fetched, generation);
        Ok(state.comment_view(post_id).unwrap_or_default())
    }

    /// Mark a post's comment list so the next read refetches it.
    pub fn invalidate_comments(&self, post_id: PostId) {
        if let Some(entry) = self.state.lock().comments.get_mut(&post_id) {
            entry.stale = true;
        }
    }

    /// Comment count to display for a post.
    pub fn comment_count(&self, post_id: PostId) -> i64 {
        let state = self.state.lock();
        let pending = state.pending.get(&post_id).map_or(0, |p| p.len() as i64);
        match state.comments.get(&post_id) {
            Some(entry) => entry.confirmed.len() as i64 + pending,
            None => {
                state.page_counts.get(&post_id).copied().unwrap_or(0)
                    + state
                        .confirmed_unloaded
                        .get(&post_id)
                        .map_or(0, |c| c.len() as i64)
                    + pending
            }
        }
    }

    /// Apply a comment locally before sending it.
    pub fn begin_comment(&self, post_id: PostId, content: &str) -> Result<PendingComment, ClientError> {
        if !is_valid_comment_content(content) {
            return Err(ClientError::Validation(
                "Comment content is required".to_string(),
            ));
        }

        let temp_id = TempId::new();
        self.state
            .lock()
            .pending
            .entry(post_id)
            .or_default()
            .push(ProvisionalComment {
                temp_id,
                post_id,
                content: content.to_string(),
                created_at: Utc::now(),
            });

        Ok(PendingComment {
            temp_id,
            post_id,
            content: content.to_string(),
        })
    }

    /// Send a pending comment and reconcile the cache with the answer.
    ///
    /// Creation is not idempotent, so it is attempted once.
    pub async fn settle_comment(&self, pending: PendingComment) -> Result<Comment, ClientError> {
        let result = self
            .transport
            .create_comment(CreateCommentInput {
                post_id: pending.post_id,
                content: pending.content.clone(),
            })
            .await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.remove_pending(pending.post_id, pending.temp_id);

        match result {
            Ok(comment) => {
                *state.generations.entry(pending.post_id).or_default() += 1;
                match state.comments.get_mut(&pending.post_id) {
                    Some(entry) => {
                        if !entry.confirmed.iter().any(|c| c.id == comment.id) {
                            entry.confirmed.push(comment.clone());
                        }
                        entry.stale = true;
                    }
                    None => {
                        state
                            .confirmed_unloaded
                            .entry(pending.post_id)
                            .or_default()
                            .push(comment.clone());
                    }
                }
                Ok(comment)
            }
            Err(e) => {
                tracing::warn!(
                    "Comment on post {} failed, dropping provisional entry: {}",
                    pending.post_id,
                    e
                );
                Err(e)
            }
        }
    }

    /// [`FeedCache::begin_comment`] followed by [`FeedCache::settle_comment`].
    pub async fn submit_comment(&self, post_id: PostId, content: &str) -> Result<Comment, ClientError> {
        let pending = self.begin_comment(post_id, content)?;
        self.settle_comment(pending).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::MemoryTransport;

    fn cache_over(transport: Arc<MemoryTransport>) -> FeedCache {
        FeedCache::new(transport, CacheConfig::default())
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let transport = MemoryTransport::with_posts(25);
        let cache = cache_over(transport.clone());

        assert_eq!(
            cache.fetch_next_page(10).await.unwrap(),
            FetchOutcome::Appended { count: 10 }
        );
        assert_eq!(
            cache.fetch_next_page(10).await.unwrap(),
            FetchOutcome::Appended { count: 10 }
        );
        assert_eq!(
            cache.fetch_next_page(10).await.unwrap(),
            FetchOutcome::Appended { count: 5 }
        );
        assert!(!cache.has_next_page(10));
        assert_eq!(cache.fetch_next_page(10).await.unwrap(), FetchOutcome::Exhausted);
        assert_eq!(transport.list_calls(), 3);

        let ids: Vec<_> = cache.posts(10).iter().map(|p| p.id()).collect();
        assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_page_keys_are_independent() {
        let transport = MemoryTransport::with_posts(25);
        let cache = cache_over(transport);

        cache.fetch_next_page(10).await.unwrap();
        cache.fetch_next_page(5).await.unwrap();
        assert_eq!(cache.posts(10).len(), 10);
        assert_eq!(cache.posts(5).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_deduplicated() {
        let transport = MemoryTransport::with_posts(25);
        transport.set_list_delay(Duration::from_millis(50));
        let cache = cache_over(transport.clone());

        let (a, b) = tokio::join!(cache.fetch_next_page(10), cache.fetch_next_page(10));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, FetchOutcome::InFlight));
        assert_eq!(
            outcomes,
            vec![FetchOutcome::Appended { count: 10 }, FetchOutcome::InFlight]
        );
        assert_eq!(transport.list_calls(), 1);
        assert!(!cache.is_fetching(10));
        assert_eq!(cache.posts(10).len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_fetch_retries_then_records_error() {
        let transport = MemoryTransport::with_posts(25);
        transport.fail_list(vec![
            ClientError::Transport("down".to_string()),
            ClientError::Transport("down".to_string()),
            ClientError::Transport("down".to_string()),
        ]);
        let cache = cache_over(transport.clone());

        let err = cache.fetch_next_page(10).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.list_calls(), 3);
        assert_eq!(cache.last_error(10), Some(err));
        assert!(!cache.is_fetching(10));

        // A later attempt starts from the same cursor
        cache.fetch_next_page(10).await.unwrap();
        assert_eq!(cache.last_error(10), None);
        assert_eq!(cache.posts(10)[0].id(), 1);
    }

    #[tokio::test]
    async fn test_comments_served_fresh_from_cache() {
        let transport = MemoryTransport::with_posts(3);
        transport.add_comment(2, "first");
        let cache = cache_over(transport.clone());

        let comments = cache.comments(2, false).await.unwrap();
        assert_eq!(comments.len(), 1);
        cache.comments(2, false).await.unwrap();
        assert_eq!(transport.comment_calls(), 1);

        cache.comments(2, true).await.unwrap();
        assert_eq!(transport.comment_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_comments_refetched_after_freshness_window() {
        let transport = MemoryTransport::with_posts(3);
        let cache = cache_over(transport.clone());

        cache.comments(1, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cache.is_fresh(1));
        cache.comments(1, false).await.unwrap();
        assert_eq!(transport.comment_calls(), 2);
    }

    #[tokio::test]
    async fn test_comments_of_missing_post() {
        let transport = MemoryTransport::with_posts(3);
        let cache = cache_over(transport);

        let err = cache.comments(99, false).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_optimistic_comment_confirmed_once() {
        let transport = MemoryTransport::with_posts(3);
        transport.add_comment(1, "existing");
        let cache = cache_over(transport.clone());
        cache.fetch_next_page(10).await.unwrap();
        cache.comments(1, false).await.unwrap();
        assert_eq!(cache.comment_count(1), 1);

        let pending = cache.begin_comment(1, "hello").unwrap();
        let view = cache.cached_comments(1).unwrap();
        assert_eq!(view.len(), 2);
        assert!(view[1].is_provisional());
        assert_eq!(view[1].content(), "hello");
        assert_eq!(cache.comment_count(1), 2);
        assert_eq!(transport.create_calls(), 0);

        let confirmed = cache.settle_comment(pending).await.unwrap();
        let view = cache.cached_comments(1).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view[1], CachedComment::Confirmed(confirmed));
        assert_eq!(cache.comment_count(1), 2);

        // The mutation marked the list stale; the refetch still counts it once
        assert!(!cache.is_fresh(1));
        let refetched = cache.comments(1, false).await.unwrap();
        assert_eq!(refetched.iter().filter(|c| c.content() == "hello").count(), 1);
        assert_eq!(cache.comment_count(1), 2);
    }

    #[tokio::test]
    async fn test_optimistic_comment_rolled_back_on_failure() {
        let transport = MemoryTransport::with_posts(3);
        let cache = cache_over(transport.clone());
        cache.fetch_next_page(10).await.unwrap();
        cache.comments(3, false).await.unwrap();
        transport.fail_create(ClientError::Transport("down".to_string()));

        let pending = cache.begin_comment(3, "lost").unwrap();
        assert_eq!(cache.comment_count(3), 1);

        let err = cache.settle_comment(pending).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cache.comment_count(3), 0);
        assert!(cache.cached_comments(3).unwrap().is_empty());
        assert_eq!(transport.create_calls(), 1);
        assert!(cache.is_fresh(3));
    }

    #[tokio::test]
    async fn test_count_without_loaded_list() {
        let transport = MemoryTransport::with_posts(3);
        transport.add_comment(2, "a");
        transport.add_comment(2, "b");
        let cache = cache_over(transport.clone());
        cache.fetch_next_page(10).await.unwrap();
        assert_eq!(cache.comment_count(2), 2);

        cache.submit_comment(2, "c").await.unwrap();
        assert_eq!(cache.comment_count(2), 3);
        assert!(cache.cached_comments(2).is_none());

        // Loading the list switches the count to the authoritative list length
        let comments = cache.comments(2, false).await.unwrap();
        assert_eq!(comments.len(), 3);
        assert_eq!(cache.comment_count(2), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_comment_confirmed_during_first_fetch_is_kept() {
        let transport = MemoryTransport::with_posts(3);
        transport.set_comment_delay(Duration::from_millis(50));
        let cache = cache_over(transport.clone());
        cache.fetch_next_page(10).await.unwrap();

        let (fetched, created) = tokio::join!(
            cache.comments(1, false),
            cache.submit_comment(1, "hello")
        );
        let created = created.unwrap();

        // The answer was read before the comment existed
        assert!(fetched.unwrap().iter().any(|c| c.content() == "hello"));
        assert_eq!(cache.comment_count(1), 1);
        assert_eq!(
            cache.cached_comments(1).unwrap(),
            vec![CachedComment::Confirmed(created)]
        );
        assert!(!cache.is_fresh(1));

        // The next read refetches and still counts it once
        let refetched = cache.comments(1, false).await.unwrap();
        assert_eq!(refetched.len(), 1);
        assert_eq!(cache.comment_count(1), 1);
        assert!(cache.is_fresh(1));
        assert_eq!(transport.comment_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refetch_racing_confirmation_keeps_comment() {
        let transport = MemoryTransport::with_posts(3);
        transport.add_comment(2, "existing");
        let cache = cache_over(transport.clone());
        cache.fetch_next_page(10).await.unwrap();
        cache.comments(2, false).await.unwrap();
        transport.set_comment_delay(Duration::from_millis(50));

        let (fetched, created) =
            tokio::join!(cache.comments(2, true), cache.submit_comment(2, "hello"));
        fetched.unwrap();
        created.unwrap();

        let view = cache.cached_comments(2).unwrap();
        let contents: Vec<_> = view.iter().map(CachedComment::content).collect();
        assert_eq!(contents, vec!["existing", "hello"]);
        assert!(view.iter().all(|c| !c.is_provisional()));
        assert_eq!(cache.comment_count(2), 2);
        assert!(!cache.is_fresh(2));
    }

    #[tokio::test]
    async fn test_empty_comment_rejected_locally() {
        let transport = MemoryTransport::with_posts(5);
        let cache = cache_over(transport.clone());

        let err = cache.submit_comment(5, "   ").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(transport.create_calls(), 0);
        assert_eq!(cache.comment_count(5), 0);
    }
}
