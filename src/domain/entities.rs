//! Persisted records read by the feed queries.
//!
//! Post and source identifiers are opaque strings: they originate in the
//! ingestion pipeline and the external ranking service, which both speak the
//! same id namespace.

use serde::Serialize;
use time::OffsetDateTime;

/// A post row as the feed queries project it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub image: Option<String>,
    pub source_id: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
