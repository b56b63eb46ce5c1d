//! Client for the external personalization/ranking service.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::feeds::FeedFilters;

#[derive(Debug, Error)]
pub enum RankerError {
    #[error("ranking request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ranking service returned status {0}")]
    Status(u16),
    #[error("ranking response could not be parsed: {0}")]
    Malformed(String),
}

/// One fetch window against the ranking service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingRequest {
    /// Items to return.
    pub page_size: usize,
    /// Leading ranks the service should always recompute instead of serving
    /// from its own cache.
    pub fresh_page_size: usize,
    pub user_id: Option<String>,
    pub filters: FeedFilters,
}

#[async_trait]
pub trait Ranker: Send + Sync {
    /// Fetch one ranked window of post ids, best first.
    ///
    /// The returned list is at most `page_size` long but may be shorter. A
    /// non-2xx response or transport failure surfaces as an error; no retry
    /// happens here.
    async fn fetch_ranking(&self, request: &RankingRequest) -> Result<Vec<String>, RankerError>;
}

#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub base_url: Url,
    pub token: String,
}

/// HTTP implementation speaking the `feed.json` contract.
pub struct HttpRanker {
    client: reqwest::Client,
    config: RankerConfig,
}

#[derive(Debug, Deserialize)]
struct RankingEnvelope {
    data: Vec<RankedItem>,
}

#[derive(Debug, Deserialize)]
struct RankedItem {
    post_id: String,
}

impl HttpRanker {
    pub fn new(client: reqwest::Client, config: RankerConfig) -> Self {
        Self { client, config }
    }

    /// Build the request URL with parameters in their fixed order, omitting
    /// empty optional parameters entirely.
    fn feed_url(&self, request: &RankingRequest) -> Result<Url, RankerError> {
        let mut url = self
            .config
            .base_url
            .join("feed.json")
            .map_err(|err| RankerError::Malformed(err.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("token", &self.config.token);
            pairs.append_pair("page_size", &request.page_size.to_string());
            pairs.append_pair("fresh_page_size", &request.fresh_page_size.to_string());
            if let Some(user_id) = request.user_id.as_deref()
                && !user_id.is_empty()
            {
                pairs.append_pair("user_id", user_id);
            }
            if !request.filters.include_tags.is_empty() {
                pairs.append_pair("allowed_tags", &request.filters.include_tags.join(","));
            }
            if !request.filters.blocked_tags.is_empty() {
                pairs.append_pair("blocked_tags", &request.filters.blocked_tags.join(","));
            }
            if !request.filters.exclude_sources.is_empty() {
                pairs.append_pair("blocked_sources", &request.filters.exclude_sources.join(","));
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl Ranker for HttpRanker {
    async fn fetch_ranking(&self, request: &RankingRequest) -> Result<Vec<String>, RankerError> {
        let url = self.feed_url(request)?;
        let started = std::time::Instant::now();
        let response = self.client.get(url).send().await?;
        metrics::histogram!("rivus_ranker_fetch_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let status = response.status();
        if !status.is_success() {
            return Err(RankerError::Status(status.as_u16()));
        }

        let envelope: RankingEnvelope = response
            .json()
            .await
            .map_err(|err| RankerError::Malformed(err.to_string()))?;

        Ok(envelope
            .data
            .into_iter()
            .map(|item| item.post_id)
            .collect())
    }
}
