//! Asynchronous post ingestion.
//!
//! Messages arrive over the job queue, get deduplicated by URL, and come out
//! the other side as rankable, filterable posts.

use apalis::prelude::{Data, Error as ApalisError, Storage};
use apalis_sql::postgres::PostgresStorage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::infra::db::map_sqlx_error;

use super::context::{IngestWorkerContext, job_failed};

/// Queue namespace consumed by the ingestion worker.
pub const INGEST_POST_NAMESPACE: &str = "rivus::IngestPost";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPostMessage {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source_id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to enqueue job: {0}")]
    Enqueue(String),
}

/// Producer side of the ingestion queue.
#[async_trait]
pub trait IngestQueue: Send + Sync {
    async fn enqueue(&self, message: IngestPostMessage) -> Result<(), QueueError>;
}

/// [`IngestQueue`] backed by the apalis Postgres storage the worker drains.
#[derive(Clone)]
pub struct ApalisIngestQueue {
    storage: PostgresStorage<IngestPostMessage>,
}

impl ApalisIngestQueue {
    pub fn new(storage: PostgresStorage<IngestPostMessage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl IngestQueue for ApalisIngestQueue {
    async fn enqueue(&self, message: IngestPostMessage) -> Result<(), QueueError> {
        let mut storage = self.storage.clone();
        storage
            .push(message)
            .await
            .map_err(|err| QueueError::Enqueue(err.to_string()))?;
        Ok(())
    }
}

pub async fn process_ingest_post_job(
    message: IngestPostMessage,
    context: Data<IngestWorkerContext>,
) -> Result<(), ApalisError> {
    let repositories = context.repositories.clone();

    let inserted = sqlx::query(
        "INSERT INTO posts (id, title, url, image, source_id, published_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (url) DO NOTHING",
    )
    .bind(&message.id)
    .bind(&message.title)
    .bind(&message.url)
    .bind(&message.image)
    .bind(&message.source_id)
    .bind(message.published_at)
    .execute(repositories.pool())
    .await
    .map_err(|err| job_failed(map_sqlx_error(err)))?
    .rows_affected();

    if inserted == 0 {
        info!(
            target = "application::jobs::process_ingest_post_job",
            id = message.id,
            url = message.url,
            "post already ingested, skipping"
        );
        return Ok(());
    }

    let keywords = keyword_terms(&message);
    if !keywords.is_empty() {
        sqlx::query(
            "INSERT INTO post_keywords (post_id, keyword) \
             SELECT $1, unnest($2::text[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&message.id)
        .bind(&keywords)
        .execute(repositories.pool())
        .await
        .map_err(|err| job_failed(map_sqlx_error(err)))?;
    }

    metrics::counter!("rivus_posts_ingested_total").increment(1);
    info!(
        target = "application::jobs::process_ingest_post_job",
        id = message.id,
        source_id = message.source_id,
        keywords = keywords.len(),
        "post ingested"
    );

    Ok(())
}

/// Tags and keywords share one association table; both make a post matchable
/// by the tag predicates.
fn keyword_terms(message: &IngestPostMessage) -> Vec<String> {
    let mut terms: Vec<String> = Vec::with_capacity(message.tags.len() + message.keywords.len());
    for term in message.tags.iter().chain(message.keywords.iter()) {
        let normalized = term.trim().to_lowercase();
        if !normalized.is_empty() && !terms.contains(&normalized) {
            terms.push(normalized);
        }
    }
    terms
}
