//! Composable SQL predicate expressions for feed queries.
//!
//! Predicates are pure values: builders return [`Expr`] nodes that callers
//! combine with [`Expr::and`]/[`Expr::or`]/[`Expr::not`] and the repository
//! renders into a parameterized `WHERE` clause. User-controlled values are
//! always pushed as bind parameters; only structural text from the builders
//! themselves (table names, column references, aliases) is interpolated.

use std::borrow::Cow;

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A structural column reference, interpolated verbatim. Only builders in
    /// this module construct these, from fixed strings.
    Column(Cow<'static, str>),
    Text(String),
    TextArray(Vec<String>),
    Bool(bool),
    Uuid(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    /// `column = ANY(values)`; the array is a single bind parameter.
    AnyOf,
}

/// Boolean expression tree rendered into a parameterized SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Neutral element: renders as `TRUE`.
    True,
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Correlated existence subquery. `from` is a structural from-clause;
    /// correlation happens through the conditions.
    Exists {
        from: Cow<'static, str>,
        conditions: Vec<Expr>,
    },
    Compare {
        column: Cow<'static, str>,
        op: CompareOp,
        value: Operand,
    },
}

impl Expr {
    pub fn and(self, other: Expr) -> Expr {
        match (self, other) {
            (Expr::True, rhs) => rhs,
            (lhs, Expr::True) => lhs,
            (Expr::And(mut terms), rhs) => {
                terms.push(rhs);
                Expr::And(terms)
            }
            (lhs, rhs) => Expr::And(vec![lhs, rhs]),
        }
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(vec![self, other])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    fn compare(
        column: impl Into<Cow<'static, str>>,
        op: CompareOp,
        value: Operand,
    ) -> Expr {
        Expr::Compare {
            column: column.into(),
            op,
            value,
        }
    }

    /// Render into the query builder, binding every non-structural value.
    pub fn push_to(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Expr::True => {
                qb.push("TRUE");
            }
            Expr::And(terms) | Expr::Or(terms) if terms.is_empty() => {
                qb.push("TRUE");
            }
            Expr::And(terms) => push_joined(qb, terms, " AND "),
            Expr::Or(terms) => push_joined(qb, terms, " OR "),
            Expr::Not(inner) => {
                qb.push("NOT (");
                inner.push_to(qb);
                qb.push(")");
            }
            Expr::Exists { from, conditions } => {
                qb.push("EXISTS (SELECT 1 FROM ");
                qb.push(from.as_ref());
                qb.push(" WHERE ");
                if conditions.is_empty() {
                    qb.push("TRUE");
                } else {
                    push_joined(qb, conditions, " AND ");
                }
                qb.push(")");
            }
            Expr::Compare { column, op, value } => {
                qb.push(column.as_ref());
                match op {
                    CompareOp::Eq => qb.push(" = "),
                    CompareOp::AnyOf => qb.push(" = ANY("),
                };
                match value {
                    Operand::Column(reference) => {
                        qb.push(reference.as_ref());
                    }
                    Operand::Text(text) => {
                        qb.push_bind(text.clone());
                    }
                    Operand::TextArray(values) => {
                        qb.push_bind(values.clone());
                    }
                    Operand::Bool(flag) => {
                        qb.push_bind(*flag);
                    }
                    Operand::Uuid(id) => {
                        qb.push_bind(*id);
                    }
                };
                if matches!(op, CompareOp::AnyOf) {
                    qb.push(")");
                }
            }
        }
    }
}

fn push_joined(qb: &mut QueryBuilder<'_, Postgres>, terms: &[Expr], separator: &str) {
    qb.push("(");
    for (position, term) in terms.iter().enumerate() {
        if position > 0 {
            qb.push(separator);
        }
        term.push_to(qb);
    }
    qb.push(")");
}

/// True when the post has at least one of `tags` attached.
///
/// A correlated existence subquery rather than a join, so a post matching
/// several tags still produces a single row.
pub fn tag_membership(tags: &[String], alias: &str) -> Expr {
    Expr::Exists {
        from: Cow::Borrowed("post_keywords pk"),
        conditions: vec![
            Expr::compare(
                "pk.post_id",
                CompareOp::Eq,
                Operand::Column(Cow::Owned(format!("{alias}.id"))),
            ),
            Expr::compare(
                "pk.keyword",
                CompareOp::AnyOf,
                Operand::TextArray(tags.to_vec()),
            ),
        ],
    }
}

/// Logical complement of [`tag_membership`].
pub fn negated_tag_membership(tags: &[String], alias: &str) -> Expr {
    tag_membership(tags, alias).not()
}

/// True when the post matches at least one tag configured for the feed, or
/// when the feed has no allowed-tag configuration at all (open policy).
pub fn feed_tag_membership(feed_id: Uuid, alias: &str) -> Expr {
    let matches_configured_tag = Expr::Exists {
        from: Cow::Borrowed("post_keywords pk INNER JOIN feed_tags ft ON ft.tag = pk.keyword"),
        conditions: vec![
            Expr::compare(
                "pk.post_id",
                CompareOp::Eq,
                Operand::Column(Cow::Owned(format!("{alias}.id"))),
            ),
            Expr::compare("ft.feed_id", CompareOp::Eq, Operand::Uuid(feed_id)),
            Expr::compare("ft.blocked", CompareOp::Eq, Operand::Bool(false)),
        ],
    };
    let feed_has_tags = Expr::Exists {
        from: Cow::Borrowed("feed_tags ft"),
        conditions: vec![
            Expr::compare("ft.feed_id", CompareOp::Eq, Operand::Uuid(feed_id)),
            Expr::compare("ft.blocked", CompareOp::Eq, Operand::Bool(false)),
        ],
    };
    matches_configured_tag.or(feed_has_tags.not())
}

/// True when the post carries none of the feed's blocked tags.
pub fn feed_blocked_tag_exclusion(feed_id: Uuid, alias: &str) -> Expr {
    Expr::Exists {
        from: Cow::Borrowed("post_keywords pk INNER JOIN feed_tags ft ON ft.tag = pk.keyword"),
        conditions: vec![
            Expr::compare(
                "pk.post_id",
                CompareOp::Eq,
                Operand::Column(Cow::Owned(format!("{alias}.id"))),
            ),
            Expr::compare("ft.feed_id", CompareOp::Eq, Operand::Uuid(feed_id)),
            Expr::compare("ft.blocked", CompareOp::Eq, Operand::Bool(true)),
        ],
    }
    .not()
}

/// True when the post's source is not in the feed's excluded-source set.
pub fn feed_source_exclusion(feed_id: Uuid, alias: &str) -> Expr {
    Expr::Exists {
        from: Cow::Borrowed("feed_sources fs"),
        conditions: vec![
            Expr::compare("fs.feed_id", CompareOp::Eq, Operand::Uuid(feed_id)),
            Expr::compare(
                "fs.source_id",
                CompareOp::Eq,
                Operand::Column(Cow::Owned(format!("{alias}.source_id"))),
            ),
        ],
    }
    .not()
}

/// True when the post comes from one of `sources`.
pub fn source_membership(sources: &[String], alias: &str) -> Expr {
    Expr::compare(
        Cow::Owned(format!("{alias}.source_id")),
        CompareOp::AnyOf,
        Operand::TextArray(sources.to_vec()),
    )
}

/// Logical complement of [`source_membership`].
pub fn negated_source_membership(sources: &[String], alias: &str) -> Expr {
    source_membership(sources, alias).not()
}

/// True when the viewer has already read the post.
pub fn read_state(user_id: &str, alias: &str) -> Expr {
    Expr::Exists {
        from: Cow::Borrowed("post_views v"),
        conditions: vec![
            Expr::compare(
                "v.user_id",
                CompareOp::Eq,
                Operand::Text(user_id.to_string()),
            ),
            Expr::compare(
                "v.post_id",
                CompareOp::Eq,
                Operand::Column(Cow::Owned(format!("{alias}.id"))),
            ),
        ],
    }
}

/// Logical complement of [`read_state`].
pub fn unread_state(user_id: &str, alias: &str) -> Expr {
    read_state(user_id, alias).not()
}

/// True when the viewer has not explicitly hidden the post.
pub fn hidden_exclusion(user_id: &str, alias: &str) -> Expr {
    Expr::Exists {
        from: Cow::Borrowed("hidden_posts h"),
        conditions: vec![
            Expr::compare(
                "h.user_id",
                CompareOp::Eq,
                Operand::Text(user_id.to_string()),
            ),
            Expr::compare(
                "h.post_id",
                CompareOp::Eq,
                Operand::Column(Cow::Owned(format!("{alias}.id"))),
            ),
        ],
    }
    .not()
}

/// Whether a caller-supplied post id is safe to use in structural positions.
///
/// Ids originate in the ingestion pipeline and are URL-safe tokens; anything
/// else is rejected before the query is built.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(expr: &Expr) -> String {
        let mut qb = QueryBuilder::new("");
        expr.push_to(&mut qb);
        qb.into_sql()
    }

    #[test]
    fn tag_membership_renders_correlated_exists() {
        let sql = render(&tag_membership(&["rust".to_string()], "p"));
        assert_eq!(
            sql,
            "EXISTS (SELECT 1 FROM post_keywords pk \
             WHERE (pk.post_id = p.id AND pk.keyword = ANY($1)))"
        );
    }

    #[test]
    fn negated_tag_membership_is_the_complement() {
        let tags = vec!["rust".to_string()];
        let positive = render(&tag_membership(&tags, "p"));
        let negative = render(&negated_tag_membership(&tags, "p"));
        assert_eq!(negative, format!("NOT ({positive})"));
    }

    #[test]
    fn feed_tag_membership_keeps_the_open_policy_branch() {
        let sql = render(&feed_tag_membership(Uuid::nil(), "p"));
        // A feed with zero configured tags must match every post, so the
        // rendered predicate carries the no-configuration alternative.
        assert!(sql.contains("OR NOT (EXISTS (SELECT 1 FROM feed_tags ft"));
        assert!(sql.starts_with("(EXISTS (SELECT 1 FROM post_keywords pk"));
    }

    #[test]
    fn values_are_bound_not_interpolated() {
        let hostile = vec!["'; DROP TABLE posts; --".to_string()];
        let sql = render(&tag_membership(&hostile, "p"));
        assert!(!sql.contains("DROP TABLE"));
        assert!(sql.contains("$1"));
    }

    #[test]
    fn and_chain_flattens_and_skips_the_neutral_element() {
        let expr = Expr::True
            .and(source_membership(&["a".to_string()], "p"))
            .and(unread_state("u1", "p"));
        let sql = render(&expr);
        assert!(sql.starts_with("(p.source_id = ANY($1) AND NOT (EXISTS"));
    }

    #[test]
    fn true_renders_as_neutral_predicate() {
        assert_eq!(render(&Expr::True), "TRUE");
        assert_eq!(render(&Expr::And(Vec::new())), "TRUE");
    }

    #[test]
    fn safe_id_rejects_structural_characters() {
        assert!(is_safe_id("p-4fT_9"));
        assert!(!is_safe_id(""));
        assert!(!is_safe_id("id'); --"));
        assert!(!is_safe_id("id with spaces"));
    }
}
