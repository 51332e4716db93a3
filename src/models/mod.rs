//! Data models shared by the query service and the feed client.
//!
//! Field names serialize in camelCase to match the RPC contract.

mod comment;
mod page;
mod post;
mod user;

pub use comment::*;
pub use page::*;
pub use post::*;
pub use user::*;
