use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use rivus::application::feed::{FeedCacheTuning, FeedRanking, FeedService};
use rivus::application::jobs::{IngestPostMessage, IngestQueue, QueueError};
use rivus::application::ranker::{Ranker, RankerError, RankingRequest};
use rivus::application::repos::{
    FeedBase, FeedConfigRepo, FeedOrder, FeedQuery, FeedQueryRepo, RepoError,
};
use rivus::cache::MemoryFeedStore;
use rivus::domain::entities::PostRecord;
use rivus::domain::feeds::FeedFilters;
use rivus::infra::db::PostgresRepositories;
use rivus::infra::http::{ApiState, build_router};

fn post(id: &str) -> PostRecord {
    PostRecord {
        id: id.to_string(),
        title: format!("post {id}"),
        url: format!("https://example.com/posts/{id}"),
        image: None,
        source_id: "src-1".to_string(),
        published_at: None,
        created_at: time::OffsetDateTime::UNIX_EPOCH,
    }
}

/// Serves a fixed post catalog, honoring fixed-id membership/order and the
/// LIMIT of freshness queries.
struct CatalogRepo {
    catalog: Vec<PostRecord>,
}

#[async_trait]
impl FeedQueryRepo for CatalogRepo {
    async fn list_feed_posts(&self, query: &FeedQuery) -> Result<Vec<PostRecord>, RepoError> {
        match (&query.base, &query.order) {
            (FeedBase::FixedIds { .. }, FeedOrder::ByIds(order)) => Ok(order
                .iter()
                .filter_map(|id| self.catalog.iter().find(|post| &post.id == id).cloned())
                .collect()),
            _ => Ok(self
                .catalog
                .iter()
                .take(query.limit as usize)
                .cloned()
                .collect()),
        }
    }
}

struct StaticConfigRepo {
    known: Option<Uuid>,
}

#[async_trait]
impl FeedConfigRepo for StaticConfigRepo {
    async fn load_filters(&self, _feed_id: Uuid) -> Result<FeedFilters, RepoError> {
        Ok(FeedFilters::default())
    }

    async fn feed_exists(&self, feed_id: Uuid) -> Result<bool, RepoError> {
        Ok(self.known == Some(feed_id))
    }
}

struct CountingRanker {
    ids: Vec<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl Ranker for CountingRanker {
    async fn fetch_ranking(&self, request: &RankingRequest) -> Result<Vec<String>, RankerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ids.iter().take(request.page_size).cloned().collect())
    }
}

#[derive(Default)]
struct RecordingQueue {
    messages: Mutex<Vec<IngestPostMessage>>,
}

#[async_trait]
impl IngestQueue for RecordingQueue {
    async fn enqueue(&self, message: IngestPostMessage) -> Result<(), QueueError> {
        self.messages.lock().await.push(message);
        Ok(())
    }
}

struct Harness {
    state: ApiState,
    ranker: Arc<CountingRanker>,
    queue: Arc<RecordingQueue>,
}

fn harness(known_feed: Option<Uuid>) -> Harness {
    let ranker = Arc::new(CountingRanker {
        ids: vec!["1".to_string(), "2".to_string(), "3".to_string()],
        calls: AtomicUsize::new(0),
    });
    let ranking = Arc::new(FeedRanking::new(
        Arc::new(MemoryFeedStore::new()),
        ranker.clone(),
        FeedCacheTuning::default(),
    ));
    let repo = Arc::new(CatalogRepo {
        catalog: vec![post("1"), post("2"), post("3")],
    });
    let config = Arc::new(StaticConfigRepo { known: known_feed });
    let feeds = Arc::new(FeedService::new(repo, config.clone(), ranking));

    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/rivus_test")
        .expect("lazy pool");
    let queue = Arc::new(RecordingQueue::default());

    Harness {
        state: ApiState {
            feeds,
            feed_config: config,
            ingest: queue.clone(),
            db: Arc::new(PostgresRepositories::new(pool)),
        },
        ranker,
        queue,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn anonymous_feed_serves_ranked_posts_in_order() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let response = app
        .oneshot(get("/feeds/anonymous?limit=2"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|item| item["id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(harness.ranker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn anonymous_feed_second_page_comes_from_the_cache() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let first = app
        .clone()
        .oneshot(get("/feeds/anonymous?limit=3"))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(get("/feeds/anonymous?limit=2&offset=1"))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);

    let body = body_json(second).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|item| item["id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec!["2", "3"]);
    assert_eq!(harness.ranker.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_personalized_feed_is_404() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let response = app
        .oneshot(get(&format!("/feeds/{}", Uuid::new_v4())))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_cursor_is_a_bad_request() {
    let feed_id = Uuid::new_v4();
    let harness = harness(Some(feed_id));
    let app = build_router(harness.state);

    let response = app
        .oneshot(get(&format!("/feeds/{feed_id}?after=%40%40%40")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_cursor");
}

#[tokio::test]
async fn personalized_feed_paginates_with_cursors() {
    let feed_id = Uuid::new_v4();
    let harness = harness(Some(feed_id));
    let app = build_router(harness.state);

    let response = app
        .oneshot(get(&format!("/feeds/{feed_id}?first=2")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let edges = body["edges"].as_array().expect("edges");
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0]["node"]["id"], "1");
    assert!(body["page_info"]["has_next_page"].as_bool().expect("flag"));
}

#[tokio::test]
async fn tag_listing_discards_the_probe_row() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let response = app
        .oneshot(get("/tags/rust/posts?first=2"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["edges"].as_array().expect("edges").len(), 2);
    assert!(body["page_info"]["has_next_page"].as_bool().expect("flag"));
}

#[tokio::test]
async fn bookmarks_without_a_viewer_are_rejected() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let response = app.oneshot(get("/bookmarks")).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bookmarks_with_a_viewer_resolve() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let request = Request::get("/bookmarks?first=1")
        .header("user-id", "u1")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ingest_accepts_and_enqueues_the_message() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let request = Request::post("/posts/ingest")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"id":"p9","title":"t","url":"https://example.com/p9","source_id":"src-1"}"#,
        ))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let messages = harness.queue.messages.lock().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "p9");
}

#[tokio::test]
async fn ingest_rejects_a_message_without_an_id() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let request = Request::post("/posts/ingest")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"id":"","title":"t","url":"https://example.com/p9","source_id":"src-1"}"#,
        ))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_invalidation_forces_the_next_request_to_refetch() {
    let harness = harness(None);
    let app = build_router(harness.state);

    let warm = app
        .clone()
        .oneshot(get("/feeds/anonymous?limit=2"))
        .await
        .expect("response");
    assert_eq!(warm.status(), StatusCode::OK);
    assert_eq!(harness.ranker.calls.load(Ordering::SeqCst), 1);

    let invalidate = app
        .clone()
        .oneshot(
            Request::post("/cache/invalidate")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(invalidate.status(), StatusCode::NO_CONTENT);

    let cold = app
        .oneshot(get("/feeds/anonymous?limit=2"))
        .await
        .expect("response");
    assert_eq!(cold.status(), StatusCode::OK);
    assert_eq!(harness.ranker.calls.load(Ordering::SeqCst), 2);
}
