use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::application::feed::{BookmarksFeed, FeedVariant, SourceFeed, TagFeed, UnreadOnly};
use crate::application::jobs::IngestPostMessage;
use crate::application::pagination::{ConnectionArgs, OffsetArgs};

use super::error::ApiError;
use super::models::{ByIdsQuery, ConnectionQuery, FilterQuery};
use super::{ApiState, USER_ID_HEADER};

fn viewer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

pub async fn health(State(state): State<ApiState>) -> Response {
    match state.db.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

pub async fn anonymous_feed(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<FilterQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let args = OffsetArgs {
        limit: query.limit,
        offset: query.offset,
    };
    let posts = state
        .feeds
        .anonymous_feed(&query.filters(), viewer(&headers), &args)
        .await?;
    Ok(Json(json!({ "data": posts })))
}

pub async fn personalized_feed(
    State(state): State<ApiState>,
    Path(feed_id): Path<Uuid>,
    headers: HeaderMap,
    Query(args): Query<ConnectionArgs>,
) -> Result<impl IntoResponse, ApiError> {
    let connection = state
        .feeds
        .personalized_connection(feed_id, viewer(&headers), &args)
        .await?;
    Ok(Json(connection))
}

pub async fn random_feed(
    State(state): State<ApiState>,
    Path(feed_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if !state.feed_config.feed_exists(feed_id).await? {
        return Err(ApiError::not_found("unknown feed"));
    }
    let filters = state.feed_config.load_filters(feed_id).await?;
    let posts = state
        .feeds
        .random_feed(&filters, viewer(&headers))
        .await?;
    Ok(Json(json!({ "data": posts })))
}

async fn listing_connection<V: FeedVariant>(
    state: &ApiState,
    variant: V,
    headers: &HeaderMap,
    query: &ConnectionQuery,
) -> Result<Response, ApiError> {
    let args = query.args();
    let user = viewer(headers);
    let connection = if query.unread_only() {
        let Some(user) = user else {
            return Err(ApiError::bad_request(
                "unread filtering requires a viewer",
                Some(format!("missing `{USER_ID_HEADER}` header")),
            ));
        };
        let narrowed = UnreadOnly {
            inner: variant,
            user_id: user.to_string(),
        };
        state.feeds.connection(&narrowed, Some(user), &args).await?
    } else {
        state.feeds.connection(&variant, user, &args).await?
    };
    Ok(Json(connection).into_response())
}

pub async fn tag_posts(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ConnectionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    listing_connection(&state, TagFeed { tag }, &headers, &query).await
}

pub async fn source_posts(
    State(state): State<ApiState>,
    Path(source_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ConnectionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    listing_connection(&state, SourceFeed { source_id }, &headers, &query).await
}

pub async fn bookmarks(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ConnectionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user) = viewer(&headers) else {
        return Err(ApiError::bad_request(
            "bookmarks require a viewer",
            Some(format!("missing `{USER_ID_HEADER}` header")),
        ));
    };
    let variant = BookmarksFeed {
        user_id: user.to_string(),
    };
    listing_connection(&state, variant, &headers, &query).await
}

pub async fn posts_by_ids(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ByIdsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state
        .feeds
        .posts_by_ids(query.ids(), viewer(&headers))
        .await?;
    Ok(Json(json!({ "data": posts })))
}

pub async fn ingest_post(
    State(state): State<ApiState>,
    Json(message): Json<IngestPostMessage>,
) -> Result<impl IntoResponse, ApiError> {
    if message.id.is_empty() || message.url.is_empty() {
        return Err(ApiError::bad_request(
            "id and url are required",
            None,
        ));
    }
    state.ingest.enqueue(message).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn invalidate_cache(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    state.feeds.ranking().invalidate_all().await?;
    Ok(StatusCode::NO_CONTENT)
}
