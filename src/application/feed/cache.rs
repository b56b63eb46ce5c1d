//! Cache-or-fetch orchestration for ranked feeds.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::application::error::FeedError;
use crate::application::ranker::{Ranker, RankingRequest};
use crate::cache::{FeedStore, keys};
use crate::domain::feeds::FeedFilters;

/// What ranked list to serve, and which slice of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSpec {
    pub feed_id: Option<String>,
    pub user_id: Option<String>,
    pub page_size: usize,
    pub offset: usize,
}

/// Tunable staleness behavior. Defaults preserve the historical values: a
/// thirty-minute staleness threshold and a fresh window of one rank.
#[derive(Debug, Clone, Copy)]
pub struct FeedCacheTuning {
    pub staleness_threshold: Duration,
    pub fresh_page_size: usize,
}

impl Default for FeedCacheTuning {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::from_secs(30 * 60),
            fresh_page_size: 1,
        }
    }
}

/// Serves ranked pages of post ids, consulting the ranking service only when
/// the cached ranking cannot answer the request.
///
/// This manager is the sole writer of ranked-feed cache entries. The
/// read-decide-fetch-write sequence is deliberately not serialized across
/// concurrent requests for the same key: duplicate fetches append
/// overlapping, idempotent-by-id rank ranges and the freshness timestamp is
/// last-write-wins.
pub struct FeedRanking {
    store: Arc<dyn FeedStore>,
    ranker: Arc<dyn Ranker>,
    tuning: FeedCacheTuning,
}

impl FeedRanking {
    pub fn new(store: Arc<dyn FeedStore>, ranker: Arc<dyn Ranker>, tuning: FeedCacheTuning) -> Self {
        Self {
            store,
            ranker,
            tuning,
        }
    }

    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    /// Return the `[offset, offset + page_size)` slice of the ranked feed,
    /// fetching from the ranking service when the cache cannot serve it.
    pub async fn get_feed(
        &self,
        spec: &FeedSpec,
        filters: &FeedFilters,
    ) -> Result<Vec<String>, FeedError> {
        if spec.page_size == 0 {
            return Ok(Vec::new());
        }
        // Offsets past the i64 range cannot address any ranked entry.
        let end = match spec.offset.checked_add(spec.page_size) {
            Some(end) if end <= i64::MAX as usize => end,
            _ => return Ok(Vec::new()),
        };

        let key = keys::feed_key(spec.feed_id.as_deref(), spec.user_id.as_deref());
        let time_key = keys::time_key(&key);

        let updated_at = self.read_timestamp(&time_key).await?;
        let cached = self.store.count(&key).await?;

        let needs_fetch = match updated_at {
            None => true,
            Some(timestamp) => {
                end > cached || (spec.offset == 0 && self.is_stale(timestamp))
            }
        };

        if !needs_fetch {
            counter!("rivus_feed_cache_hit_total").increment(1);
            let stop = end as i64 - 1;
            return Ok(self.store.get_range(&key, spec.offset as i64, stop).await?);
        }

        counter!("rivus_feed_cache_miss_total").increment(1);
        debug!(key, offset = spec.offset, cached, "ranked feed cache miss");

        let request = RankingRequest {
            page_size: spec.page_size,
            fresh_page_size: self.tuning.fresh_page_size,
            user_id: spec.user_id.clone(),
            filters: filters.clone(),
        };
        let fetched = self.ranker.fetch_ranking(&request).await?;
        counter!("rivus_ranker_fetch_total").increment(1);

        // Caching is at-most-effort: a failed write still lets this request
        // serve the fetched page once.
        if let Err(error) = self.write_ranking(&key, &time_key, cached, &fetched).await {
            warn!(key, error = %error, "failed to persist fetched ranking");
        }

        if spec.offset == 0 {
            // The freshly fetched head wins over whatever tail was cached.
            let mut page = fetched;
            page.truncate(spec.page_size);
            return Ok(page);
        }

        let stop = end as i64 - 1;
        Ok(self.store.get_range(&key, spec.offset as i64, stop).await?)
    }

    async fn read_timestamp(&self, time_key: &str) -> Result<Option<OffsetDateTime>, FeedError> {
        let Some(raw) = self.store.get_value(time_key).await? else {
            return Ok(None);
        };
        match OffsetDateTime::parse(&raw, &Rfc3339) {
            Ok(timestamp) => Ok(Some(timestamp)),
            Err(_) => {
                // Unparseable timestamps behave like a cold cache.
                warn!(time_key, raw, "discarding unreadable freshness timestamp");
                Ok(None)
            }
        }
    }

    fn is_stale(&self, updated_at: OffsetDateTime) -> bool {
        let age = OffsetDateTime::now_utc() - updated_at;
        age >= self.tuning.staleness_threshold
    }

    async fn write_ranking(
        &self,
        key: &str,
        time_key: &str,
        cached: usize,
        ids: &[String],
    ) -> Result<(), FeedError> {
        let entries: Vec<(f64, String)> = ids
            .iter()
            .enumerate()
            .map(|(position, id)| ((cached + position) as f64, id.clone()))
            .collect();
        self.store.add_scored(key, &entries).await?;

        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| FeedError::CacheUnavailable(crate::cache::StoreError::Unavailable(
                err.to_string(),
            )))?;
        self.store.set_value(time_key, &now).await?;
        Ok(())
    }

    /// Drop every ranked-feed entry and freshness timestamp.
    pub async fn invalidate_all(&self) -> Result<(), FeedError> {
        self.store.delete_by_pattern(keys::FEED_KEY_PATTERN).await?;
        Ok(())
    }
}
