//! Infinitely scrolling feed view.
//!
//! [`FeedView`] is headless: the host reports scroll position, viewport size and measured row
//! heights, and asks for a [`RenderWindow`] describing which rows to draw and where. Only rows
//! inside the window have a mounted [`CommentPanel`]; whether a row's comments are expanded is
//! remembered per post id, so a row scrolled out and back in comes back the way it was left.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{
    ClientError, CommentPanel, Debouncer, FeedCache, FetchOutcome, LayoutConfig, RowLayout,
};
use crate::models::{Comment, PostId, PostSummary, DEFAULT_PAGE_LIMIT};

#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Posts requested per page
    pub page_limit: i64,
    /// Rows rendered beyond each edge of the viewport
    pub overscan: usize,
    /// Fetch the next page once the last rendered row is this close to the end
    pub fetch_threshold: usize,
    pub default_height: f64,
    pub min_height: f64,
    /// Quiet period before a resize is applied
    pub resize_debounce: Duration,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            overscan: 3,
            fetch_threshold: 2,
            default_height: 400.0,
            min_height: 250.0,
            resize_debounce: Duration::from_millis(150),
        }
    }
}

impl ViewConfig {
    fn layout(&self) -> LayoutConfig {
        LayoutConfig {
            default_height: self.default_height,
            min_height: self.min_height,
            overscan: self.overscan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// One row to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualRow {
    pub index: usize,
    pub post_id: PostId,
    pub top: f64,
    pub height: f64,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderWindow {
    pub range: Range<usize>,
    pub rows: Vec<VirtualRow>,
    pub total_height: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Loading,
    Failed(ClientError),
    Exhausted,
}

pub struct FeedView {
    cache: Arc<FeedCache>,
    config: ViewConfig,
    posts: Vec<PostSummary>,
    layout: RowLayout,
    expanded: HashMap<PostId, bool>,
    panels: HashMap<PostId, CommentPanel>,
    viewport: Viewport,
    scroll_offset: f64,
    resize: Debouncer<Viewport>,
    fetch_state: FetchState,
}

impl FeedView {
    pub fn new(cache: Arc<FeedCache>, config: ViewConfig, viewport: Viewport) -> Self {
        let mut view = Self {
            layout: RowLayout::new(config.layout()),
            resize: Debouncer::new(config.resize_debounce),
            cache,
            config,
            posts: Vec::new(),
            expanded: HashMap::new(),
            panels: HashMap::new(),
            viewport,
            scroll_offset: 0.0,
            fetch_state: FetchState::Idle,
        };
        // Another consumer may already have pages for this key
        view.sync_posts();
        view
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn posts(&self) -> &[PostSummary] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    pub fn fetch_state(&self) -> &FetchState {
        &self.fetch_state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    pub fn is_expanded(&self, post_id: PostId) -> bool {
        self.expanded.get(&post_id).copied().unwrap_or(false)
    }

    pub fn panel(&self, post_id: PostId) -> Option<&CommentPanel> {
        self.panels.get(&post_id)
    }

    pub fn mounted_panels(&self) -> usize {
        self.panels.len()
    }

    pub fn comment_count(&self, post_id: PostId) -> i64 {
        self.cache.comment_count(post_id)
    }

    // ==================== PAGING ====================

    fn sync_posts(&mut self) {
        self.posts = self.cache.posts(self.config.page_limit);
        self.layout
            .set_rows(self.posts.iter().map(PostSummary::id).collect());
    }

    /// Request the next page and lay out the appended rows.
    pub async fn load_more(&mut self) -> Result<FetchOutcome, ClientError> {
        if self.fetch_state == FetchState::Exhausted {
            return Ok(FetchOutcome::Exhausted);
        }

        self.fetch_state = FetchState::Loading;
        match self.cache.fetch_next_page(self.config.page_limit).await {
            Ok(outcome) => {
                self.sync_posts();
                self.fetch_state = if self.cache.has_next_page(self.config.page_limit) {
                    FetchState::Idle
                } else {
                    FetchState::Exhausted
                };
                Ok(outcome)
            }
            Err(e) => {
                warn!("Feed page failed to load: {}", e);
                self.fetch_state = FetchState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Try again after a failed page fetch.
    pub async fn retry(&mut self) -> Result<FetchOutcome, ClientError> {
        if matches!(self.fetch_state, FetchState::Failed(_)) {
            self.fetch_state = FetchState::Idle;
        }
        self.load_more().await
    }

    /// Whether rendering up to row `stop` should pull the next page.
    pub fn should_fetch_more(&self, stop: usize) -> bool {
        stop + self.config.fetch_threshold >= self.posts.len()
            && self.fetch_state == FetchState::Idle
            && self.cache.has_next_page(self.config.page_limit)
            && !self.cache.is_fetching(self.config.page_limit)
    }

    /// Report the last rendered row. Fetches the next page when it is near the end.
    pub async fn rows_rendered(&mut self, stop: usize) -> Result<Option<FetchOutcome>, ClientError> {
        if !self.should_fetch_more(stop) {
            return Ok(None);
        }
        debug!("Row {} of {} rendered, loading more", stop, self.posts.len());
        self.load_more().await.map(Some)
    }

    // ==================== LAYOUT ====================

    pub fn scroll_to(&mut self, offset: f64) {
        self.scroll_offset = offset.max(0.0);
    }

    /// Report a row's measured height. Returns true if layout changed.
    pub fn measure_row(&mut self, post_id: PostId, height: f64) -> bool {
        self.layout.measure(post_id, height)
    }

    /// Schedule a viewport change. Applied by [`FeedView::pump`] once resizing settles.
    pub fn on_resize(&mut self, viewport: Viewport) {
        self.resize.trigger(viewport);
    }

    /// Apply a settled resize. Every measured height is discarded since widths changed.
    pub fn pump(&mut self) -> bool {
        match self.resize.take_ready() {
            Some(viewport) => {
                debug!("Viewport resized to {}x{}", viewport.width, viewport.height);
                self.viewport = viewport;
                self.layout.clear_measurements();
                true
            }
            None => false,
        }
    }

    /// Compute the rows to draw and mount panels for the expanded rows among them.
    pub async fn render(&mut self) -> RenderWindow {
        self.pump();

        let range = self
            .layout
            .visible_range(self.scroll_offset, self.viewport.height);
        let visible: Vec<PostId> = range.clone().filter_map(|i| self.layout.key(i)).collect();

        self.panels.retain(|post_id, _| visible.contains(post_id));
        for &post_id in &visible {
            if !self.is_expanded(post_id) || self.panels.contains_key(&post_id) {
                continue;
            }
            let mut panel = CommentPanel::new(post_id);
            if let Err(e) = panel.expand(&self.cache).await {
                debug!("Remounted panel of post {} failed: {}", post_id, e);
                self.expanded.insert(post_id, false);
            }
            self.panels.insert(post_id, panel);
        }

        let mut rows = Vec::with_capacity(visible.len());
        for (index, post_id) in range.clone().zip(visible) {
            rows.push(VirtualRow {
                index,
                post_id,
                top: self.layout.row_top(index),
                height: self.layout.height(index),
                expanded: self.is_expanded(post_id),
            });
        }

        RenderWindow {
            range,
            rows,
            total_height: self.layout.total_height(),
        }
    }

    // ==================== COMMENTS ====================

    /// Expand or collapse a row's comments. Returns whether the row is now expanded.
    pub async fn toggle_comments(&mut self, post_id: PostId) -> Result<bool, ClientError> {
        let panel = self
            .panels
            .entry(post_id)
            .or_insert_with(|| CommentPanel::new(post_id));
        let result = panel.toggle(&self.cache).await;
        // Only a loaded panel is remembered as open
        self.expanded.insert(post_id, panel.is_loaded());
        self.layout.invalidate(post_id);
        result
    }

    /// Submit a comment from a row's panel.
    pub async fn submit_comment(
        &mut self,
        post_id: PostId,
        content: &str,
    ) -> Result<Comment, ClientError> {
        let panel = self
            .panels
            .entry(post_id)
            .or_insert_with(|| CommentPanel::new(post_id));
        panel.set_draft(content);
        let result = panel.submit(&self.cache).await;
        self.layout.invalidate(post_id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::MemoryTransport;
    use crate::client::{CacheConfig, PanelState, RetryPolicy};

    const VIEWPORT: Viewport = Viewport {
        width: 600.0,
        height: 800.0,
    };

    fn view_over(transport: Arc<MemoryTransport>) -> FeedView {
        let cache = FeedCache::new(
            transport,
            CacheConfig {
                retry: RetryPolicy::none(),
                ..CacheConfig::default()
            },
        );
        FeedView::new(Arc::new(cache), ViewConfig::default(), VIEWPORT)
    }

    async fn loaded_view(posts: i64) -> (Arc<MemoryTransport>, FeedView) {
        let transport = MemoryTransport::with_posts(posts);
        let mut view = view_over(transport.clone());
        while view.fetch_state() != &FetchState::Exhausted {
            view.load_more().await.unwrap();
        }
        (transport, view)
    }

    #[tokio::test]
    async fn test_threshold_pulls_next_page() {
        let transport = MemoryTransport::with_posts(25);
        let mut view = view_over(transport.clone());

        assert!(view.should_fetch_more(0));
        view.rows_rendered(0).await.unwrap();
        assert_eq!(view.len(), 10);

        assert_eq!(view.rows_rendered(5).await.unwrap(), None);
        assert_eq!(
            view.rows_rendered(8).await.unwrap(),
            Some(FetchOutcome::Appended { count: 10 })
        );
        assert_eq!(
            view.rows_rendered(18).await.unwrap(),
            Some(FetchOutcome::Appended { count: 5 })
        );
        assert_eq!(view.fetch_state(), &FetchState::Exhausted);
        assert_eq!(view.rows_rendered(24).await.unwrap(), None);
        assert_eq!(transport.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_new_page_keeps_measured_rows() {
        let transport = MemoryTransport::with_posts(25);
        let mut view = view_over(transport);
        view.load_more().await.unwrap();
        view.measure_row(3, 600.0);
        view.render().await;

        view.load_more().await.unwrap();
        assert_eq!(view.layout().dirty_from(), Some(10));
        assert_eq!(view.layout().height(2), 600.0);
        assert_eq!(view.layout().height(12), 400.0);
    }

    #[tokio::test]
    async fn test_window_is_bounded() {
        let (_transport, mut view) = loaded_view(25).await;

        let window = view.render().await;
        assert_eq!(window.range, 0..6);
        assert_eq!(window.rows.len(), 6);
        assert_eq!(window.total_height, 25.0 * 400.0);
        assert_eq!(window.rows[1].top, 400.0);

        view.scroll_to(4000.0);
        let window = view.render().await;
        assert_eq!(window.range, 7..16);
        assert_eq!(window.rows[0].post_id, 8);
    }

    #[tokio::test]
    async fn test_expanded_rows_survive_unmount() {
        let (transport, mut view) = loaded_view(25).await;
        transport.add_comment(1, "first");

        assert!(view.toggle_comments(1).await.unwrap());
        view.render().await;
        assert_eq!(view.panel(1).map(|p| p.comments().len()), Some(1));

        view.scroll_to(5000.0);
        view.render().await;
        assert!(view.panel(1).is_none());
        assert!(view.is_expanded(1));

        view.scroll_to(0.0);
        let window = view.render().await;
        assert!(window.rows[0].expanded);
        assert_eq!(view.panel(1).map(|p| p.comments().len()), Some(1));
        assert_eq!(transport.comment_calls(), 1);
    }

    #[tokio::test]
    async fn test_toggle_invalidates_row_height() {
        let (_transport, mut view) = loaded_view(10).await;
        view.measure_row(2, 500.0);
        view.render().await;

        view.toggle_comments(2).await.unwrap();
        assert!(!view.layout().is_measured(2));
        assert_eq!(view.layout().dirty_from(), Some(1));

        assert!(!view.toggle_comments(2).await.unwrap());
        assert!(!view.is_expanded(2));
    }

    #[tokio::test]
    async fn test_failed_expand_not_remembered() {
        let (transport, mut view) = loaded_view(25).await;
        transport.fail_comments(ClientError::NotFound("gone".to_string()));

        assert!(view.toggle_comments(1).await.is_err());
        assert!(!view.is_expanded(1));
        let window = view.render().await;
        assert!(!window.rows[0].expanded);
        assert!(matches!(
            view.panel(1).map(|p| p.state()),
            Some(PanelState::Failed(_))
        ));

        // Toggling again loads instead of collapsing
        assert!(view.toggle_comments(1).await.unwrap());
        assert!(view.is_expanded(1));
        assert_eq!(transport.comment_calls(), 2);

        // A failed remount clears the remembered flag
        view.scroll_to(5000.0);
        view.render().await;
        assert!(view.panel(1).is_none());
        view.cache().invalidate_comments(1);
        transport.fail_comments(ClientError::NotFound("gone".to_string()));
        view.scroll_to(0.0);
        view.render().await;
        assert!(!view.is_expanded(1));
        assert_eq!(transport.comment_calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_page_then_retry() {
        let transport = MemoryTransport::with_posts(25);
        transport.fail_list(vec![ClientError::Transport("down".to_string())]);
        let mut view = view_over(transport.clone());

        assert!(view.load_more().await.is_err());
        assert!(matches!(view.fetch_state(), FetchState::Failed(_)));
        assert!(!view.should_fetch_more(0));

        assert_eq!(
            view.retry().await.unwrap(),
            FetchOutcome::Appended { count: 10 }
        );
        assert_eq!(view.fetch_state(), &FetchState::Idle);
        assert_eq!(view.posts()[0].id(), 1);
    }

    #[tokio::test]
    async fn test_submit_counts_once() {
        let (transport, mut view) = loaded_view(10).await;
        transport.add_comment(4, "existing");
        // Page counts were taken before the comment existed
        assert_eq!(view.comment_count(4), 0);

        view.toggle_comments(4).await.unwrap();
        assert_eq!(view.comment_count(4), 1);

        view.submit_comment(4, "hi").await.unwrap();
        assert_eq!(view.comment_count(4), 2);
        assert_eq!(view.panel(4).map(|p| p.comments().len()), Some(2));
        assert_eq!(transport.stored_comments(4), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_burst_applied_once() {
        let (_transport, mut view) = loaded_view(10).await;
        view.measure_row(1, 700.0);
        view.measure_row(2, 700.0);

        for width in [500.0, 450.0, 400.0] {
            view.on_resize(Viewport {
                width,
                height: 900.0,
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(!view.pump());
        }
        assert!(view.layout().is_measured(1));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(view.pump());
        assert_eq!(view.viewport().width, 400.0);
        assert!(!view.layout().is_measured(1));
        assert!(!view.layout().is_measured(2));
        assert!(!view.pump());
    }
}
