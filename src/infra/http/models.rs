//! Wire models for the feed API.

use serde::Deserialize;

use crate::application::pagination::ConnectionArgs;
use crate::domain::feeds::FeedFilters;

/// Query parameters accepted by the anonymous and random feed endpoints.
/// List parameters are comma-joined.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterQuery {
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    pub allowed_tags: Option<String>,
    pub blocked_tags: Option<String>,
    pub allowed_sources: Option<String>,
    pub blocked_sources: Option<String>,
}

impl FilterQuery {
    pub fn filters(&self) -> FeedFilters {
        FeedFilters {
            include_tags: split_csv(self.allowed_tags.as_deref()),
            blocked_tags: split_csv(self.blocked_tags.as_deref()),
            include_sources: split_csv(self.allowed_sources.as_deref()),
            exclude_sources: split_csv(self.blocked_sources.as_deref()),
        }
    }
}

/// Cursor pagination plus the optional unread-only narrowing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionQuery {
    pub first: Option<u32>,
    pub after: Option<String>,
    pub unread: Option<bool>,
}

impl ConnectionQuery {
    pub fn args(&self) -> ConnectionArgs {
        ConnectionArgs {
            first: self.first,
            after: self.after.clone(),
        }
    }

    pub fn unread_only(&self) -> bool {
        self.unread.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ByIdsQuery {
    pub ids: Option<String>,
}

impl ByIdsQuery {
    pub fn ids(&self) -> Vec<String> {
        split_csv(self.ids.as_deref())
    }
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
