//! Feed resolution: variant strategies, query composition, and the
//! cache-backed personalized feed.

pub mod cache;

use std::sync::Arc;

use uuid::Uuid;

use crate::application::error::FeedError;
use crate::application::pagination::{Connection, ConnectionArgs, OffsetArgs, PageRequest};
use crate::application::repos::{FeedBase, FeedConfigRepo, FeedOrder, FeedQuery, FeedQueryRepo};
use crate::domain::entities::PostRecord;
use crate::domain::feeds::FeedFilters;
use crate::infra::db::predicate::{
    self, Expr, feed_blocked_tag_exclusion, feed_source_exclusion, feed_tag_membership,
    hidden_exclusion, negated_source_membership, negated_tag_membership, source_membership,
    tag_membership, unread_state,
};

pub use cache::{FeedCacheTuning, FeedRanking, FeedSpec};

const RANDOM_FEED_LIMIT: u32 = 30;

/// One shape of feed. A variant contributes the base relation, its own
/// predicate, and the row ordering; the resolver supplies pagination, the
/// viewer's hidden-post exclusion, and execution.
pub trait FeedVariant: Send + Sync {
    fn base(&self) -> FeedBase;
    fn predicate(&self) -> Result<Expr, FeedError>;
    fn order(&self) -> FeedOrder;
}

/// Posts carrying one tag.
pub struct TagFeed {
    pub tag: String,
}

impl FeedVariant for TagFeed {
    fn base(&self) -> FeedBase {
        FeedBase::Posts
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        Ok(tag_membership(std::slice::from_ref(&self.tag), "p"))
    }

    fn order(&self) -> FeedOrder {
        FeedOrder::Freshness
    }
}

/// Posts from one source.
pub struct SourceFeed {
    pub source_id: String,
}

impl FeedVariant for SourceFeed {
    fn base(&self) -> FeedBase {
        FeedBase::Posts
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        Ok(source_membership(
            std::slice::from_ref(&self.source_id),
            "p",
        ))
    }

    fn order(&self) -> FeedOrder {
        FeedOrder::Freshness
    }
}

/// A user-configured feed resolved directly against its stored tag and
/// source rows. A feed with no tag rows is open: every post matches.
pub struct ConfiguredFeed {
    pub feed_id: Uuid,
}

impl FeedVariant for ConfiguredFeed {
    fn base(&self) -> FeedBase {
        FeedBase::Posts
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        Ok(feed_tag_membership(self.feed_id, "p")
            .and(feed_blocked_tag_exclusion(self.feed_id, "p"))
            .and(feed_source_exclusion(self.feed_id, "p")))
    }

    fn order(&self) -> FeedOrder {
        FeedOrder::Freshness
    }
}

/// A user's bookmarked posts.
pub struct BookmarksFeed {
    pub user_id: String,
}

impl FeedVariant for BookmarksFeed {
    fn base(&self) -> FeedBase {
        FeedBase::Bookmarks {
            user_id: self.user_id.clone(),
        }
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        Ok(Expr::True)
    }

    fn order(&self) -> FeedOrder {
        FeedOrder::Freshness
    }
}

/// An ad-hoc filtered feed built from explicit tag and source lists.
///
/// Include lists win over block lists: when both are present only the
/// include list applies.
pub struct FilteredFeed {
    pub filters: FeedFilters,
}

impl FilteredFeed {
    fn filters_predicate(filters: &FeedFilters) -> Expr {
        let tags = if !filters.include_tags.is_empty() {
            tag_membership(&filters.include_tags, "p")
        } else if !filters.blocked_tags.is_empty() {
            negated_tag_membership(&filters.blocked_tags, "p")
        } else {
            Expr::True
        };
        let sources = if !filters.include_sources.is_empty() {
            source_membership(&filters.include_sources, "p")
        } else if !filters.exclude_sources.is_empty() {
            negated_source_membership(&filters.exclude_sources, "p")
        } else {
            Expr::True
        };
        tags.and(sources)
    }
}

impl FeedVariant for FilteredFeed {
    fn base(&self) -> FeedBase {
        FeedBase::Posts
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        Ok(Self::filters_predicate(&self.filters))
    }

    fn order(&self) -> FeedOrder {
        FeedOrder::Freshness
    }
}

/// An explicit id list served back in the caller's order.
pub struct FixedIdsFeed {
    pub ids: Vec<String>,
}

impl FeedVariant for FixedIdsFeed {
    fn base(&self) -> FeedBase {
        FeedBase::FixedIds {
            ids: self.ids.clone(),
        }
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        for id in &self.ids {
            if !predicate::is_safe_id(id) {
                return Err(FeedError::InvalidFilter(format!(
                    "post id {id:?} is not a safe identifier"
                )));
            }
        }
        Ok(Expr::True)
    }

    fn order(&self) -> FeedOrder {
        FeedOrder::ByIds(self.ids.clone())
    }
}

/// Narrows any variant to posts the viewer has not read yet.
pub struct UnreadOnly<V> {
    pub inner: V,
    pub user_id: String,
}

impl<V: FeedVariant> FeedVariant for UnreadOnly<V> {
    fn base(&self) -> FeedBase {
        self.inner.base()
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        Ok(self
            .inner
            .predicate()?
            .and(unread_state(&self.user_id, "p")))
    }

    fn order(&self) -> FeedOrder {
        self.inner.order()
    }
}

/// A random sample under the same filter predicate as [`FilteredFeed`].
pub struct RandomFeed {
    pub filters: FeedFilters,
}

impl FeedVariant for RandomFeed {
    fn base(&self) -> FeedBase {
        FeedBase::Posts
    }

    fn predicate(&self) -> Result<Expr, FeedError> {
        Ok(FilteredFeed::filters_predicate(&self.filters))
    }

    fn order(&self) -> FeedOrder {
        FeedOrder::Random
    }
}

/// Resolves every feed shape: parses pagination, composes the query from the
/// variant, executes it, and maps rows into a connection.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn FeedQueryRepo>,
    feed_config: Arc<dyn FeedConfigRepo>,
    ranking: Arc<FeedRanking>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn FeedQueryRepo>,
        feed_config: Arc<dyn FeedConfigRepo>,
        ranking: Arc<FeedRanking>,
    ) -> Self {
        Self {
            posts,
            feed_config,
            ranking,
        }
    }

    pub fn ranking(&self) -> &Arc<FeedRanking> {
        &self.ranking
    }

    /// Resolve a cursor-paginated connection for any variant.
    pub async fn connection(
        &self,
        variant: &dyn FeedVariant,
        viewer: Option<&str>,
        args: &ConnectionArgs,
    ) -> Result<Connection<PostRecord>, FeedError> {
        let page = PageRequest::from_connection(args)?;
        let rows = self.execute(variant, viewer, page).await?;
        Ok(Connection::from_rows(rows, page))
    }

    /// The anonymous ranked feed: ids come from the ranking cache, rows from
    /// a fixed-id query preserving rank order.
    pub async fn anonymous_feed(
        &self,
        filters: &FeedFilters,
        viewer: Option<&str>,
        args: &OffsetArgs,
    ) -> Result<Vec<PostRecord>, FeedError> {
        let page = PageRequest::from_offset(args);
        let spec = FeedSpec {
            feed_id: None,
            user_id: viewer.map(str::to_string),
            page_size: page.limit as usize,
            offset: page.offset as usize,
        };
        let ids = self.ranking.get_feed(&spec, filters).await?;
        self.resolve_ranked_ids(ids, viewer).await
    }

    /// A configured feed served in personalized rank order, cursor paginated.
    ///
    /// The probe row for `has_next_page` comes from asking the ranking cache
    /// for one id beyond the page.
    pub async fn personalized_connection(
        &self,
        feed_id: Uuid,
        viewer: Option<&str>,
        args: &ConnectionArgs,
    ) -> Result<Connection<PostRecord>, FeedError> {
        if !self.feed_config.feed_exists(feed_id).await? {
            return Err(FeedError::UnknownFeed);
        }
        let filters = self.feed_config.load_filters(feed_id).await?;

        let page = PageRequest::from_connection(args)?;
        let spec = FeedSpec {
            feed_id: Some(feed_id.to_string()),
            user_id: viewer.map(str::to_string),
            page_size: page.limit as usize + 1,
            offset: page.offset as usize,
        };
        let ids = self.ranking.get_feed(&spec, &filters).await?;

        let has_more = ids.len() > page.limit as usize;
        let page_ids: Vec<String> = ids.into_iter().take(page.limit as usize).collect();
        let rows = self.resolve_ranked_ids(page_ids, viewer).await?;
        let mut connection = Connection::from_rows(rows, page);
        // More ids in the ranking means more pages, even though the row
        // query itself carried no probe.
        connection.page_info.has_next_page = has_more;
        Ok(connection)
    }

    /// A random sample, no cursors, flat list.
    pub async fn random_feed(
        &self,
        filters: &FeedFilters,
        viewer: Option<&str>,
    ) -> Result<Vec<PostRecord>, FeedError> {
        let variant = RandomFeed {
            filters: filters.clone(),
        };
        let page = PageRequest {
            limit: RANDOM_FEED_LIMIT,
            offset: 0,
        };
        let mut rows = self.execute(&variant, viewer, page).await?;
        rows.truncate(RANDOM_FEED_LIMIT as usize);
        Ok(rows)
    }

    /// Look up explicit ids, preserving the given order.
    pub async fn posts_by_ids(
        &self,
        ids: Vec<String>,
        viewer: Option<&str>,
    ) -> Result<Vec<PostRecord>, FeedError> {
        self.resolve_ranked_ids(ids, viewer).await
    }

    async fn execute(
        &self,
        variant: &dyn FeedVariant,
        viewer: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, FeedError> {
        let mut filter = variant.predicate()?;
        if let Some(user) = viewer {
            filter = filter.and(hidden_exclusion(user, "p"));
        }
        let query = FeedQuery {
            base: variant.base(),
            filter,
            order: variant.order(),
            // One extra row tells the mapper whether another page exists.
            limit: i64::from(page.limit) + 1,
            offset: Some(page.offset as i64),
        };
        Ok(self.posts.list_feed_posts(&query).await?)
    }

    async fn resolve_ranked_ids(
        &self,
        ids: Vec<String>,
        viewer: Option<&str>,
    ) -> Result<Vec<PostRecord>, FeedError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let limit = ids.len() as i64;
        let variant = FixedIdsFeed { ids };
        let mut filter = variant.predicate()?;
        if let Some(user) = viewer {
            filter = filter.and(hidden_exclusion(user, "p"));
        }
        let query = FeedQuery {
            base: variant.base(),
            filter,
            order: variant.order(),
            limit,
            offset: None,
        };
        Ok(self.posts.list_feed_posts(&query).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::application::ranker::{Ranker, RankerError, RankingRequest};
    use crate::application::repos::RepoError;
    use crate::cache::MemoryFeedStore;

    struct RecordingRepo {
        queries: Mutex<Vec<FeedQuery>>,
        rows: Vec<PostRecord>,
    }

    impl RecordingRepo {
        fn returning(rows: Vec<PostRecord>) -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
                rows,
            }
        }

        fn last_query(&self) -> FeedQuery {
            self.queries.lock().unwrap().last().cloned().expect("a query was issued")
        }
    }

    #[async_trait]
    impl FeedQueryRepo for RecordingRepo {
        async fn list_feed_posts(&self, query: &FeedQuery) -> Result<Vec<PostRecord>, RepoError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.rows.clone())
        }
    }

    struct StaticConfigRepo {
        exists: bool,
        filters: FeedFilters,
    }

    #[async_trait]
    impl FeedConfigRepo for StaticConfigRepo {
        async fn load_filters(&self, _feed_id: Uuid) -> Result<FeedFilters, RepoError> {
            Ok(self.filters.clone())
        }

        async fn feed_exists(&self, _feed_id: Uuid) -> Result<bool, RepoError> {
            Ok(self.exists)
        }
    }

    struct StaticRanker {
        ids: Vec<String>,
    }

    #[async_trait]
    impl Ranker for StaticRanker {
        async fn fetch_ranking(
            &self,
            request: &RankingRequest,
        ) -> Result<Vec<String>, RankerError> {
            Ok(self.ids.iter().take(request.page_size).cloned().collect())
        }
    }

    fn post(id: &str) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            title: format!("post {id}"),
            url: format!("https://example.com/{id}"),
            image: None,
            source_id: "src".to_string(),
            published_at: None,
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn service(repo: Arc<RecordingRepo>, ranked: &[&str]) -> FeedService {
        let ranking = Arc::new(FeedRanking::new(
            Arc::new(MemoryFeedStore::new()),
            Arc::new(StaticRanker {
                ids: ranked.iter().map(|id| (*id).to_string()).collect(),
            }),
            FeedCacheTuning::default(),
        ));
        FeedService::new(
            repo,
            Arc::new(StaticConfigRepo {
                exists: true,
                filters: FeedFilters::default(),
            }),
            ranking,
        )
    }

    #[tokio::test]
    async fn connection_requests_one_probe_row_and_viewer_exclusion() {
        let repo = Arc::new(RecordingRepo::returning(vec![post("a")]));
        let service = service(repo.clone(), &[]);

        let variant = TagFeed {
            tag: "rust".to_string(),
        };
        let args = ConnectionArgs {
            first: Some(5),
            after: None,
        };
        let connection = service
            .connection(&variant, Some("u1"), &args)
            .await
            .unwrap();
        assert_eq!(connection.edges.len(), 1);
        assert!(!connection.page_info.has_next_page);

        let query = repo.last_query();
        assert_eq!(query.limit, 6);
        assert_eq!(query.offset, Some(0));
        assert_eq!(query.order, FeedOrder::Freshness);
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected_before_any_query() {
        let repo = Arc::new(RecordingRepo::returning(Vec::new()));
        let service = service(repo.clone(), &[]);

        let args = ConnectionArgs {
            first: None,
            after: Some("@@@".to_string()),
        };
        let variant = TagFeed {
            tag: "rust".to_string(),
        };
        let err = service.connection(&variant, None, &args).await.unwrap_err();
        assert!(matches!(err, FeedError::InvalidCursor(_)));
        assert!(repo.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_feed_orders_rows_by_rank() {
        let repo = Arc::new(RecordingRepo::returning(vec![post("2"), post("1")]));
        let service = service(repo.clone(), &["1", "2"]);

        let args = OffsetArgs {
            limit: Some(2),
            offset: Some(0),
        };
        service
            .anonymous_feed(&FeedFilters::default(), None, &args)
            .await
            .unwrap();

        let query = repo.last_query();
        assert_eq!(
            query.base,
            FeedBase::FixedIds {
                ids: vec!["1".to_string(), "2".to_string()]
            }
        );
        assert_eq!(
            query.order,
            FeedOrder::ByIds(vec!["1".to_string(), "2".to_string()])
        );
    }

    #[tokio::test]
    async fn unknown_feed_is_reported_without_touching_the_cache() {
        let repo = Arc::new(RecordingRepo::returning(Vec::new()));
        let ranking = Arc::new(FeedRanking::new(
            Arc::new(MemoryFeedStore::new()),
            Arc::new(StaticRanker { ids: Vec::new() }),
            FeedCacheTuning::default(),
        ));
        let service = FeedService::new(
            repo,
            Arc::new(StaticConfigRepo {
                exists: false,
                filters: FeedFilters::default(),
            }),
            ranking,
        );

        let err = service
            .personalized_connection(Uuid::nil(), None, &ConnectionArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::UnknownFeed));
    }

    #[tokio::test]
    async fn hostile_fixed_ids_are_rejected_before_any_query() {
        let repo = Arc::new(RecordingRepo::returning(Vec::new()));
        let service = service(repo.clone(), &[]);

        let err = service
            .posts_by_ids(vec!["1; DROP TABLE posts".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::InvalidFilter(_)));
        assert!(repo.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn unread_adapter_keeps_base_and_order_and_tightens_the_predicate() {
        let variant = UnreadOnly {
            inner: TagFeed {
                tag: "rust".to_string(),
            },
            user_id: "u1".to_string(),
        };
        assert_eq!(variant.base(), FeedBase::Posts);
        assert_eq!(variant.order(), FeedOrder::Freshness);

        let with_unread = variant.predicate().unwrap();
        let plain = TagFeed {
            tag: "rust".to_string(),
        }
        .predicate()
        .unwrap();
        assert_ne!(with_unread, plain);
    }

    #[tokio::test]
    async fn random_feed_is_flat_and_randomly_ordered() {
        let repo = Arc::new(RecordingRepo::returning(vec![post("a")]));
        let service = service(repo.clone(), &[]);

        let rows = service
            .random_feed(&FeedFilters::default(), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(repo.last_query().order, FeedOrder::Random);
    }
}
