//! Cache key derivation for ranked feeds.
//!
//! The sorted id sequence for a feed lives under
//! `feeds:{feed_id|"anonymous"}[:{user_id}]`; its freshness timestamp lives
//! under `{key}:time`. The anonymous and personalized namespaces never
//! collide because the anonymous key carries no user segment.

/// Segment used in place of a feed id for the anonymous feed.
pub const ANONYMOUS_SEGMENT: &str = "anonymous";

/// Glob matching every ranked-feed key, used for bulk invalidation.
pub const FEED_KEY_PATTERN: &str = "feeds:*";

/// Derive the sorted-set key for a feed.
pub fn feed_key(feed_id: Option<&str>, user_id: Option<&str>) -> String {
    let feed = feed_id.unwrap_or(ANONYMOUS_SEGMENT);
    match user_id {
        Some(user) if !user.is_empty() => format!("feeds:{feed}:{user}"),
        _ => format!("feeds:{feed}"),
    }
}

/// Derive the freshness-timestamp key paired with a sorted-set key.
pub fn time_key(feed_key: &str) -> String {
    format!("{feed_key}:time")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_key_has_no_user_segment() {
        assert_eq!(feed_key(None, None), "feeds:anonymous");
    }

    #[test]
    fn personalized_key_carries_feed_and_user() {
        assert_eq!(feed_key(Some("f1"), Some("u1")), "feeds:f1:u1");
    }

    #[test]
    fn empty_user_is_treated_as_absent() {
        assert_eq!(feed_key(Some("f1"), Some("")), "feeds:f1");
    }

    #[test]
    fn time_key_extends_the_feed_key() {
        assert_eq!(time_key("feeds:anonymous"), "feeds:anonymous:time");
    }
}
