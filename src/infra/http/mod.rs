//! HTTP surface: a thin transport over the feed services.

pub mod error;
pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::application::feed::FeedService;
use crate::application::jobs::IngestQueue;
use crate::application::repos::FeedConfigRepo;
use crate::infra::db::PostgresRepositories;

/// Header carrying the viewer id. Authentication happens upstream; the value
/// is taken as given.
pub const USER_ID_HEADER: &str = "user-id";

#[derive(Clone)]
pub struct ApiState {
    pub feeds: Arc<FeedService>,
    pub feed_config: Arc<dyn FeedConfigRepo>,
    pub ingest: Arc<dyn IngestQueue>,
    pub db: Arc<PostgresRepositories>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/feeds/anonymous", get(handlers::anonymous_feed))
        .route("/feeds/{feed_id}", get(handlers::personalized_feed))
        .route("/feeds/{feed_id}/random", get(handlers::random_feed))
        .route("/tags/{tag}/posts", get(handlers::tag_posts))
        .route("/sources/{source_id}/posts", get(handlers::source_posts))
        .route("/bookmarks", get(handlers::bookmarks))
        .route("/posts/by-ids", get(handlers::posts_by_ids))
        .route("/posts/ingest", post(handlers::ingest_post))
        .route("/cache/invalidate", post(handlers::invalidate_cache))
        .with_state(state)
}
