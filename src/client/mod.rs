//! Headless feed client.
//!
//! [`FeedCache`] is the single source of client-side truth: it proxies the RPC surface through a
//! [`FeedTransport`], deduplicates page fetches, and owns optimistic comment state and comment
//! counts. [`FeedView`] maps the growing post sequence onto a bounded window of rows and mounts a
//! [`CommentPanel`] per visible row.

mod cache;
mod comments;
mod debounce;
mod error;
mod feed;
mod layout;
mod retry;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{
    CacheConfig, CachedComment, FeedCache, FetchOutcome, PendingComment, ProvisionalComment,
    TempId,
};
pub use comments::{CommentPanel, PanelState};
pub use debounce::Debouncer;
pub use error::ClientError;
pub use feed::{FeedView, FetchState, RenderWindow, ViewConfig, Viewport, VirtualRow};
pub use layout::{LayoutConfig, RowLayout};
pub use retry::{with_retry, RetryPolicy};
pub use transport::{FeedTransport, HttpTransport};
