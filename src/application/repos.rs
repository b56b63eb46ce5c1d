//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::PaginationError;
use crate::domain::entities::PostRecord;
use crate::domain::feeds::FeedFilters;
use crate::infra::db::predicate::Expr;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Base relation a feed query selects from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedBase {
    /// All posts.
    Posts,
    /// Posts bookmarked by one user.
    Bookmarks { user_id: String },
    /// A fixed set of post ids.
    FixedIds { ids: Vec<String> },
}

/// Row ordering applied to a feed query.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOrder {
    /// Newest first.
    Freshness,
    /// The caller-supplied rank order, best first.
    ByIds(Vec<String>),
    /// Non-deterministic by design.
    Random,
}

/// A fully composed feed query ready for execution.
///
/// The executing repository applies the global exclusion policy (inactive
/// source, deleted post, banned post) on top of `filter`; viewer-specific
/// exclusions arrive already folded into `filter`.
#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub base: FeedBase,
    pub filter: Expr,
    pub order: FeedOrder,
    pub limit: i64,
    pub offset: Option<i64>,
}

#[async_trait]
pub trait FeedQueryRepo: Send + Sync {
    /// Execute a composed feed query in a single round trip.
    async fn list_feed_posts(&self, query: &FeedQuery) -> Result<Vec<PostRecord>, RepoError>;
}

#[async_trait]
pub trait FeedConfigRepo: Send + Sync {
    /// Load the tag/source filter configuration of a feed.
    ///
    /// A feed with no configuration rows yields empty filters, which the
    /// composer treats as the open policy.
    async fn load_filters(&self, feed_id: Uuid) -> Result<FeedFilters, RepoError>;

    /// Whether the feed exists at all.
    async fn feed_exists(&self, feed_id: Uuid) -> Result<bool, RepoError>;
}
