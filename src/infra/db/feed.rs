//! Feed query execution: one dynamically composed SELECT per request.

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::application::repos::{FeedBase, FeedOrder, FeedQuery, FeedQueryRepo, RepoError};
use crate::domain::entities::PostRecord;
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;

const FEED_SELECT: &str = "SELECT p.id, p.title, p.url, p.image, p.source_id, \
     p.published_at, p.created_at FROM posts p \
     INNER JOIN sources s ON s.id = p.source_id ";

fn compose(query: &FeedQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(FEED_SELECT);

    match &query.base {
        FeedBase::Posts => {}
        FeedBase::Bookmarks { user_id } => {
            qb.push("INNER JOIN bookmarks b ON b.post_id = p.id AND b.user_id = ");
            qb.push_bind(user_id.clone());
            qb.push(" ");
        }
        FeedBase::FixedIds { .. } => {}
    }

    // Global exclusion policy, applied to every feed shape.
    qb.push("WHERE s.active AND NOT p.deleted AND NOT p.banned");

    if let FeedBase::FixedIds { ids } = &query.base {
        qb.push(" AND p.id = ANY(");
        qb.push_bind(ids.clone());
        qb.push(")");
    }

    qb.push(" AND ");
    query.filter.push_to(&mut qb);

    match &query.order {
        FeedOrder::Freshness => {
            qb.push(" ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC");
        }
        FeedOrder::ByIds(ids) => {
            qb.push(" ORDER BY array_position(");
            qb.push_bind(ids.clone());
            qb.push("::text[], p.id)");
        }
        FeedOrder::Random => {
            qb.push(" ORDER BY random()");
        }
    }

    qb.push(" LIMIT ");
    qb.push_bind(query.limit);
    if let Some(offset) = query.offset {
        qb.push(" OFFSET ");
        qb.push_bind(offset);
    }

    qb
}

#[async_trait]
impl FeedQueryRepo for PostgresRepositories {
    async fn list_feed_posts(&self, query: &FeedQuery) -> Result<Vec<PostRecord>, RepoError> {
        compose(query)
            .build_query_as::<PostRecord>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
