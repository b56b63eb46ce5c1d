//! Feed configuration lookups.

use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::application::repos::{FeedConfigRepo, RepoError};
use crate::domain::feeds::FeedFilters;
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;

#[async_trait]
impl FeedConfigRepo for PostgresRepositories {
    async fn load_filters(&self, feed_id: Uuid) -> Result<FeedFilters, RepoError> {
        let tag_rows = sqlx::query("SELECT tag, blocked FROM feed_tags WHERE feed_id = $1")
            .bind(feed_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let tags: Vec<(String, bool)> = tag_rows
            .into_iter()
            .map(|row| {
                Ok::<_, sqlx::Error>((row.try_get::<String, _>("tag")?, row.try_get("blocked")?))
            })
            .collect::<Result<_, _>>()
            .map_err(map_sqlx_error)?;

        let source_rows =
            sqlx::query("SELECT source_id FROM feed_sources WHERE feed_id = $1")
                .bind(feed_id)
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        let excluded_sources: Vec<String> = source_rows
            .into_iter()
            .map(|row| row.try_get("source_id"))
            .collect::<Result<_, _>>()
            .map_err(map_sqlx_error)?;

        Ok(FeedFilters::from_rows(tags, excluded_sources))
    }

    async fn feed_exists(&self, feed_id: Uuid) -> Result<bool, RepoError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM feeds WHERE id = $1) AS present")
            .bind(feed_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.try_get("present").map_err(map_sqlx_error)
    }
}
