use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::FeedError;
use crate::application::jobs::QueueError;
use crate::application::repos::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_CURSOR: &str = "invalid_cursor";
    pub const INVALID_FILTER: &str = "invalid_filter";
    pub const UPSTREAM: &str = "upstream_error";
    pub const CACHE_UNAVAILABLE: &str = "cache_unavailable";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const QUEUE: &str = "queue_error";
    pub const REPO: &str = "repo_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::InvalidCursor(hint) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_CURSOR,
                "invalid cursor",
                Some(hint),
            ),
            FeedError::InvalidFilter(hint) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_FILTER,
                "invalid filter",
                Some(hint),
            ),
            FeedError::UnknownFeed => Self::not_found("unknown feed"),
            FeedError::UpstreamFetch(source) => Self::new(
                StatusCode::BAD_GATEWAY,
                codes::UPSTREAM,
                "ranking service unavailable",
                Some(source.to_string()),
            ),
            FeedError::CacheUnavailable(source) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CACHE_UNAVAILABLE,
                "feed cache unavailable",
                Some(source.to_string()),
            ),
            FeedError::Repo(repo) => repo.into(),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found("resource not found"),
            RepoError::InvalidInput { message } => Self::new(
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                "invalid input",
                Some(message),
            ),
            RepoError::Pagination(source) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_CURSOR,
                "invalid cursor",
                Some(source.to_string()),
            ),
            RepoError::Timeout => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "database timeout",
                None,
            ),
            RepoError::Persistence(message) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "persistence error",
                Some(message),
            ),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::QUEUE,
            "failed to enqueue job",
            Some(err.to_string()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
