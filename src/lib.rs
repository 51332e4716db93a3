//! Post feed backend
//!
//! A typed RPC service over SQLite serving paginated posts with comments, plus a headless
//! feed client: query cache with optimistic comments, virtualized list engine and per-row
//! comment panels.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod seed;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // RPC procedures
    let rpc_routes = Router::new()
        .route("/listPosts", post(api::list_posts))
        .route(
            "/listPostsWithCommentCounts",
            post(api::list_posts_with_comment_counts),
        )
        .route("/getComments", post(api::get_comments))
        .route("/createComment", post(api::create_comment));

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api/rpc", rpc_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
