//! Sorted-set feed store contract and its in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("feed cache store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value/sorted-set store backing the ranked-feed cache.
///
/// Members are ordered by ascending `(score, member)`. Writes are idempotent
/// when replayed with identical scores: re-adding a member moves it rather
/// than duplicating it.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Return members between `start` and `stop` (inclusive, zero-based).
    /// Negative indices count from the tail, `-1` being the last member.
    async fn get_range(&self, key: &str, start: i64, stop: i64)
    -> Result<Vec<String>, StoreError>;

    /// Add members with explicit scores in one batched write.
    async fn add_scored(&self, key: &str, entries: &[(f64, String)]) -> Result<(), StoreError>;

    /// Number of members currently held under `key`.
    async fn count(&self, key: &str) -> Result<usize, StoreError>;

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete every sorted set and plain value whose key matches the glob.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<(), StoreError>;
}

/// Process-local [`FeedStore`] used as the default deployment store.
///
/// One instance is shared across all request-handling tasks; the lifecycle is
/// owned by the process entry point and the handle is injected into the cache
/// manager.
#[derive(Default)]
pub struct MemoryFeedStore {
    sorted: RwLock<HashMap<String, HashMap<String, f64>>>,
    values: RwLock<HashMap<String, String>>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn glob_matches(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
        None => pattern == key,
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn get_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        let guard = self.sorted.read().await;
        let Some(members) = guard.get(key) else {
            return Ok(Vec::new());
        };

        let mut ordered: Vec<(&String, f64)> =
            members.iter().map(|(member, score)| (member, *score)).collect();
        ordered.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let len = ordered.len();
        if len == 0 {
            return Ok(Vec::new());
        }
        let from = if start < 0 {
            len.saturating_sub(start.unsigned_abs() as usize)
        } else {
            start as usize
        };
        let to = if stop < 0 {
            let back = stop.unsigned_abs() as usize;
            if back > len {
                return Ok(Vec::new());
            }
            len - back
        } else {
            (stop as usize).min(len - 1)
        };
        if from > to || from >= len {
            return Ok(Vec::new());
        }

        Ok(ordered[from..=to]
            .iter()
            .map(|(member, _)| (*member).clone())
            .collect())
    }

    async fn add_scored(&self, key: &str, entries: &[(f64, String)]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut guard = self.sorted.write().await;
        let members = guard.entry(key.to_string()).or_default();
        for (score, member) in entries {
            members.insert(member.clone(), *score);
        }
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<usize, StoreError> {
        let guard = self.sorted.read().await;
        Ok(guard.get(key).map_or(0, HashMap::len))
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut guard = self.values.write().await;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self.values.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<(), StoreError> {
        let mut sorted = self.sorted.write().await;
        sorted.retain(|key, _| !glob_matches(pattern, key));
        let mut values = self.values.write().await;
        values.retain(|key, _| !glob_matches(pattern, key));
        Ok(())
    }
}
