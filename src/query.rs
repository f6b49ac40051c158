//! Dynamic post filtering with sorting and pagination. Every provided
//! filter is conjunctive; absent filters match everything, and matching on
//! author/title substrings is case-insensitive throughout.

use crate::error::Result;
use crate::orm::{post_tags, posts};
use crate::post::{self, PostView};
use chrono::NaiveDateTime;
use sea_orm::sea_query::{Expr, Func, Query, SimpleExpr};
use sea_orm::{entity::*, query::*, DatabaseConnection, Order};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    PostedDate,
    Likes,
}

impl SortKey {
    /// Unrecognized keys fall back to the date sort rather than erroring.
    pub fn parse(key: Option<&str>) -> Self {
        match key {
            Some("likes") => SortKey::Likes,
            _ => SortKey::PostedDate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(direction: Option<&str>) -> Self {
        match direction {
            Some(d) if d.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    fn order(self) -> Order {
        match self {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PostQuery {
    pub author: Option<String>,
    pub tag_ids: Option<Vec<i64>>,
    pub min_date: Option<NaiveDateTime>,
    pub max_date: Option<NaiveDateTime>,
    pub title: Option<String>,
    pub sort_by: SortKey,
    pub sort_direction: SortDirection,
    /// Zero-based page index.
    pub page: u64,
    pub size: u64,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            author: None,
            tag_ids: None,
            min_date: None,
            max_date: None,
            title: None,
            sort_by: SortKey::PostedDate,
            sort_direction: SortDirection::Desc,
            page: 0,
            size: 10,
        }
    }
}

/// One page of results plus the totals callers need to page further.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

/// Conjunction of all provided filters. A post matches the tag filter when
/// it carries any of the given tags.
fn filter_condition(q: &PostQuery) -> Condition {
    let mut cond = Condition::all();

    if let Some(author) = q.author.as_deref().filter(|s| !s.is_empty()) {
        cond = cond.add(
            Expr::expr(Func::lower(Expr::col((
                posts::Entity,
                posts::Column::UserId,
            ))))
            .like(format!("%{}%", author.to_lowercase())),
        );
    }
    if let Some(title) = q.title.as_deref().filter(|s| !s.is_empty()) {
        cond = cond.add(
            Expr::expr(Func::lower(Expr::col((
                posts::Entity,
                posts::Column::Title,
            ))))
            .like(format!("%{}%", title.to_lowercase())),
        );
    }
    if let Some(min_date) = q.min_date {
        cond = cond.add(posts::Column::CreatedAt.gte(min_date));
    }
    if let Some(max_date) = q.max_date {
        cond = cond.add(posts::Column::CreatedAt.lte(max_date));
    }
    if let Some(tag_ids) = q.tag_ids.as_ref().filter(|ids| !ids.is_empty()) {
        cond = cond.add(
            posts::Column::PostId.in_subquery(
                Query::select()
                    .column(post_tags::Column::PostId)
                    .from(post_tags::Entity)
                    .and_where(post_tags::Column::TagId.is_in(tag_ids.clone()))
                    .to_owned(),
            ),
        );
    }
    cond
}

/// Correlated count of the post's like facts. Keeps the like-count sort
/// compatible with plain limit/offset pagination (no GROUP BY involved).
fn like_count_expr() -> SimpleExpr {
    Expr::cust("(SELECT COUNT(*) FROM post_likes WHERE post_likes.post_id = posts.post_id)")
        .into()
}

fn apply_order(select: Select<posts::Entity>, q: &PostQuery) -> Select<posts::Entity> {
    let order = q.sort_direction.order();
    let select = match q.sort_by {
        SortKey::PostedDate => select.order_by(posts::Column::CreatedAt, order.clone()),
        SortKey::Likes => select.order_by(like_count_expr(), order.clone()),
    };
    // Secondary key keeps pagination deterministic across equal primaries.
    select.order_by(posts::Column::PostId, order)
}

fn total_pages(total_elements: u64, size: u64) -> u64 {
    total_elements.div_ceil(size)
}

const MAX_PAGE_SIZE: u64 = 100;

/// Effective (offset, size) for the page. Both inputs come straight off
/// the query string, so the size is clamped and the offset saturates
/// instead of overflowing on absurd page numbers.
fn page_window(q: &PostQuery) -> (u64, u64) {
    let size = q.size.clamp(1, MAX_PAGE_SIZE);
    (q.page.saturating_mul(size), size)
}

/// Runs the filter query and projects the requested page, list-style
/// (comment trees are never embedded here).
pub async fn execute(
    db: &DatabaseConnection,
    q: &PostQuery,
    viewer: Option<&str>,
) -> Result<Page<PostView>> {
    let (offset, size) = page_window(q);
    let cond = filter_condition(q);

    let total_elements = posts::Entity::find().filter(cond.clone()).count(db).await?;

    let select = apply_order(post::row_select().filter(cond), q)
        .offset(offset)
        .limit(size);
    let rows = select.into_model::<post::PostRow>().all(db).await?;
    let content = post::project_rows(db, rows, viewer).await?;

    Ok(Page {
        content,
        page: q.page,
        size,
        total_elements,
        total_pages: total_pages(total_elements, size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql(q: &PostQuery) -> String {
        apply_order(
            posts::Entity::find().filter(filter_condition(q)),
            q,
        )
        .build(DbBackend::Postgres)
        .to_string()
    }

    #[test]
    fn absent_filters_match_everything() {
        let q = PostQuery::default();
        let sql = sql(&q);
        assert!(!sql.contains("WHERE"));
        assert!(sql.contains(r#"ORDER BY "posts"."created_at" DESC, "posts"."post_id" DESC"#));
    }

    #[test]
    fn substring_filters_are_case_insensitive() {
        let q = PostQuery {
            author: Some("Ali".to_owned()),
            title: Some("Rust".to_owned()),
            ..Default::default()
        };
        let sql = sql(&q);
        assert!(sql.contains(r#"LOWER("posts"."user_id") LIKE '%ali%'"#));
        assert!(sql.contains(r#"LOWER("posts"."title") LIKE '%rust%'"#));
    }

    #[test]
    fn date_bounds_are_inclusive_conjunctions() {
        let q = PostQuery {
            min_date: Some("2024-02-01T00:00:00".parse().unwrap()),
            max_date: Some("2024-03-01T00:00:00".parse().unwrap()),
            ..Default::default()
        };
        let sql = sql(&q);
        assert!(sql.contains(r#""posts"."created_at" >="#));
        assert!(sql.contains(r#""posts"."created_at" <="#));
        assert!(sql.contains(" AND "));
    }

    #[test]
    fn tag_filter_matches_any_of_the_given_tags() {
        let q = PostQuery {
            tag_ids: Some(vec![1, 2]),
            ..Default::default()
        };
        let sql = sql(&q);
        assert!(sql.contains(r#""posts"."post_id" IN (SELECT "post_id" FROM "post_tags" WHERE "tag_id" IN (1, 2))"#));
    }

    #[test]
    fn empty_tag_list_is_a_no_op_filter() {
        let q = PostQuery {
            tag_ids: Some(Vec::new()),
            ..Default::default()
        };
        assert!(!sql(&q).contains("post_tags"));
    }

    #[test]
    fn like_sort_orders_by_a_correlated_count() {
        let q = PostQuery {
            sort_by: SortKey::Likes,
            sort_direction: SortDirection::Asc,
            ..Default::default()
        };
        let sql = sql(&q);
        assert!(sql.contains("ORDER BY (SELECT COUNT(*) FROM post_likes"));
        assert!(sql.contains(r#""posts"."post_id" ASC"#));
    }

    #[test]
    fn sort_parsing_defaults_are_date_descending() {
        assert_eq!(SortKey::parse(None), SortKey::PostedDate);
        assert_eq!(SortKey::parse(Some("likes")), SortKey::Likes);
        assert_eq!(SortKey::parse(Some("bogus")), SortKey::PostedDate);
        assert_eq!(SortDirection::parse(None), SortDirection::Desc);
        assert_eq!(SortDirection::parse(Some("ASC")), SortDirection::Asc);
        assert_eq!(SortDirection::parse(Some("desc")), SortDirection::Desc);
    }

    #[test]
    fn page_window_saturates_and_bounds_size() {
        let q = PostQuery {
            page: u64::MAX,
            size: 10,
            ..Default::default()
        };
        assert_eq!(page_window(&q), (u64::MAX, 10));

        let q = PostQuery {
            size: 0,
            ..Default::default()
        };
        assert_eq!(page_window(&q).1, 1);

        let q = PostQuery {
            size: 10_000,
            ..Default::default()
        };
        assert_eq!(page_window(&q).1, MAX_PAGE_SIZE);
    }

    #[test]
    fn page_math_reports_totals() {
        assert_eq!(total_pages(3, 2), 2);
        assert_eq!(total_pages(4, 2), 2);
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
    }
}
