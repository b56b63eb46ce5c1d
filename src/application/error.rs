use thiserror::Error;

use crate::application::pagination::PaginationError;
use crate::application::ranker::RankerError;
use crate::application::repos::RepoError;
use crate::cache::StoreError;
use crate::infra::error::InfraError;

/// Failures surfaced by the feed subsystem.
///
/// Client-input problems (`InvalidCursor`, `InvalidFilter`) are detected
/// before any I/O happens and map to a 4xx at the HTTP boundary; the rest are
/// upstream or storage failures.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("ranking service fetch failed: {0}")]
    UpstreamFetch(#[from] RankerError),
    #[error("feed cache unavailable: {0}")]
    CacheUnavailable(#[from] StoreError),
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("unknown feed")]
    UnknownFeed,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<PaginationError> for FeedError {
    fn from(error: PaginationError) -> Self {
        match error {
            PaginationError::InvalidCursor(detail) => FeedError::InvalidCursor(detail),
        }
    }
}

/// Top-level process error, used by the binary entry point.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
