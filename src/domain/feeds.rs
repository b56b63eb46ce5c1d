//! Feed filter configuration derived from persisted feed rows.

/// Tag and source filters resolved for one request.
///
/// Derived once from `feed_tags`/`feed_sources` rows (or from explicit query
/// parameters for the anonymous feed) and treated as immutable afterwards.
/// Insertion order is preserved because it flows into the ranking service
/// query string verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilters {
    pub include_tags: Vec<String>,
    pub blocked_tags: Vec<String>,
    pub include_sources: Vec<String>,
    pub exclude_sources: Vec<String>,
}

impl FeedFilters {
    pub fn is_empty(&self) -> bool {
        self.include_tags.is_empty()
            && self.blocked_tags.is_empty()
            && self.include_sources.is_empty()
            && self.exclude_sources.is_empty()
    }

    /// Build filters from raw feed configuration rows.
    pub fn from_rows(tags: Vec<(String, bool)>, excluded_sources: Vec<String>) -> Self {
        let mut filters = FeedFilters::default();
        for (tag, blocked) in tags {
            let bucket = if blocked {
                &mut filters.blocked_tags
            } else {
                &mut filters.include_tags
            };
            if !bucket.contains(&tag) {
                bucket.push(tag);
            }
        }
        for source in excluded_sources {
            if !filters.exclude_sources.contains(&source) {
                filters.exclude_sources.push(source);
            }
        }
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_split_into_allowed_and_blocked_tags() {
        let filters = FeedFilters::from_rows(
            vec![
                ("rust".to_string(), false),
                ("java".to_string(), true),
                ("golang".to_string(), false),
                ("rust".to_string(), false),
            ],
            vec!["spam-source".to_string()],
        );

        assert_eq!(filters.include_tags, vec!["rust", "golang"]);
        assert_eq!(filters.blocked_tags, vec!["java"]);
        assert_eq!(filters.exclude_sources, vec!["spam-source"]);
        assert!(filters.include_sources.is_empty());
    }

    #[test]
    fn empty_configuration_is_empty() {
        assert!(FeedFilters::default().is_empty());
    }
}
