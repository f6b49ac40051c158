//! Post engine: CRUD, tag association and projection of posts into their
//! externally visible shape.

use crate::comment::{self, CommentView};
use crate::error::{Error, Result};
use crate::guard;
use crate::like::{self, LikeTarget};
use crate::orm::{comment_likes, comments, post_likes, post_tags, posts, users};
use crate::tag::{self, TagView};
use crate::user::Viewer;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, FromQueryResult, TransactionTrait};
use serde::Serialize;

/// Externally visible projection of a post. `comments` is None when the
/// caller did not ask for the tree; an empty list means "asked, none
/// there" and the two must stay distinguishable on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub post_id: i64,
    pub title: String,
    pub content: String,
    #[serde(with = "crate::datetime")]
    pub posted_date: NaiveDateTime,
    pub likes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<CommentView>>,
    pub is_liked: bool,
    pub author_user_id: String,
    pub author_nickname: String,
    pub tags: Vec<TagView>,
}

/// A post joined with its author's nickname.
#[derive(Debug, Clone, FromQueryResult)]
pub struct PostRow {
    pub post_id: i64,
    pub title: String,
    pub content: String,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub nickname: String,
}

pub(crate) fn row_select() -> Select<posts::Entity> {
    posts::Entity::find()
        .inner_join(users::Entity)
        .column_as(users::Column::Nickname, "nickname")
}

async fn find_row<C: ConnectionTrait>(db: &C, post_id: i64) -> Result<PostRow> {
    row_select()
        .filter(posts::Column::PostId.eq(post_id))
        .into_model::<PostRow>()
        .one(db)
        .await?
        .ok_or(Error::NotFound("post"))
}

/// Projects a batch of rows, one query per concern (likes, liked set,
/// tags). List projections never carry comment trees.
pub(crate) async fn project_rows<C: ConnectionTrait>(
    db: &C,
    rows: Vec<PostRow>,
    viewer: Option<&str>,
) -> Result<Vec<PostView>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.post_id).collect();
    let counts = like::counts_for_posts(db, &ids).await?;
    let liked = like::liked_posts_of(db, &ids, viewer).await?;
    let mut tags = tag::tags_of_posts(db, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| PostView {
            likes: counts.get(&row.post_id).copied().unwrap_or(0),
            is_liked: liked.contains(&row.post_id),
            tags: tags.remove(&row.post_id).unwrap_or_default(),
            comments: None,
            post_id: row.post_id,
            title: row.title,
            content: row.content,
            posted_date: row.created_at,
            author_user_id: row.user_id,
            author_nickname: row.nickname,
        })
        .collect())
}

/// Full projection of one post, optionally embedding the comment forest.
pub async fn get(
    db: &DatabaseConnection,
    post_id: i64,
    viewer: Option<&str>,
    include_comments: bool,
) -> Result<PostView> {
    let row = find_row(db, post_id).await?;
    let mut view = project_rows(db, vec![row], viewer)
        .await?
        .pop()
        .ok_or(Error::NotFound("post"))?;

    if include_comments {
        view.comments = Some(comment::get_top_level(db, post_id, viewer).await?);
    }
    Ok(view)
}

/// Posts by id, newest first, projected without comment trees.
pub async fn views_for_ids(
    db: &DatabaseConnection,
    post_ids: &[i64],
    viewer: Option<&str>,
) -> Result<Vec<PostView>> {
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = row_select()
        .filter(posts::Column::PostId.is_in(post_ids.to_vec()))
        .order_by_desc(posts::Column::CreatedAt)
        .order_by_desc(posts::Column::PostId)
        .into_model::<PostRow>()
        .all(db)
        .await?;
    project_rows(db, rows, viewer).await
}

async fn replace_tags<C: ConnectionTrait>(db: &C, post_id: i64, tag_ids: &[i64]) -> Result<()> {
    post_tags::Entity::delete_many()
        .filter(post_tags::Column::PostId.eq(post_id))
        .exec(db)
        .await?;

    let resolved = tag::resolve_many(db, tag_ids).await?;
    if resolved.is_empty() {
        return Ok(());
    }
    let links = resolved.into_iter().map(|tag| post_tags::ActiveModel {
        post_id: Set(post_id),
        tag_id: Set(tag.tag_id),
    });
    post_tags::Entity::insert_many(links)
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Creates a post for the authenticated author. Unknown tag ids are
/// dropped, matching the best-effort resolve semantics.
pub async fn create(
    db: &DatabaseConnection,
    author_id: &str,
    title: &str,
    content: &str,
    tag_ids: &[i64],
) -> Result<PostView> {
    let txn = db.begin().await?;

    users::Entity::find_by_id(author_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound("user"))?;

    let post = posts::ActiveModel {
        title: Set(title.to_owned()),
        content: Set(content.to_owned()),
        user_id: Set(author_id.to_owned()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    replace_tags(&txn, post.post_id, tag_ids).await?;
    txn.commit().await?;

    get(db, post.post_id, Some(author_id), false).await
}

/// Replaces title, body and the full tag set. The author never changes.
pub async fn update(
    db: &DatabaseConnection,
    post_id: i64,
    viewer: &Viewer,
    title: &str,
    content: &str,
    tag_ids: &[i64],
) -> Result<PostView> {
    let txn = db.begin().await?;

    let post = posts::Entity::find_by_id(post_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound("post"))?;
    guard::require_owner(&post.user_id, viewer)?;

    let mut post: posts::ActiveModel = post.into();
    post.title = Set(title.to_owned());
    post.content = Set(content.to_owned());
    post.update(&txn).await?;

    replace_tags(&txn, post_id, tag_ids).await?;
    txn.commit().await?;

    get(db, post_id, Some(&viewer.user_id), false).await
}

/// Deletes the post and cascades over its comments, their likes, the
/// post's own likes and its tag links, all in one transaction.
pub async fn delete(db: &DatabaseConnection, post_id: i64, viewer: &Viewer) -> Result<()> {
    let txn = db.begin().await?;

    let post = posts::Entity::find_by_id(post_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound("post"))?;
    guard::require_owner(&post.user_id, viewer)?;

    let comment_ids: Vec<i64> = comments::Entity::find()
        .select_only()
        .column(comments::Column::CommentId)
        .filter(comments::Column::PostId.eq(post_id))
        .into_tuple()
        .all(&txn)
        .await?;
    if !comment_ids.is_empty() {
        comment_likes::Entity::delete_many()
            .filter(comment_likes::Column::CommentId.is_in(comment_ids))
            .exec(&txn)
            .await?;
    }
    comments::Entity::delete_many()
        .filter(comments::Column::PostId.eq(post_id))
        .exec(&txn)
        .await?;
    post_likes::Entity::delete_many()
        .filter(post_likes::Column::PostId.eq(post_id))
        .exec(&txn)
        .await?;
    post_tags::Entity::delete_many()
        .filter(post_tags::Column::PostId.eq(post_id))
        .exec(&txn)
        .await?;
    post.delete(&txn).await?;

    txn.commit().await?;
    Ok(())
}

/// Flips the caller's like on the post and returns the new state.
pub async fn toggle_like(db: &DatabaseConnection, post_id: i64, user_id: &str) -> Result<bool> {
    like::toggle(db, LikeTarget::Post(post_id), user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn a_view(comments: Option<Vec<CommentView>>) -> PostView {
        PostView {
            post_id: 1,
            title: "t".to_owned(),
            content: "c".to_owned(),
            posted_date: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            likes: 0,
            comments,
            is_liked: false,
            author_user_id: "alice".to_owned(),
            author_nickname: "Alice".to_owned(),
            tags: vec![],
        }
    }

    #[actix_rt::test]
    async fn delete_cascades_over_all_dependents_in_one_transaction() {
        let post = posts::Model {
            post_id: 1,
            title: "title".to_owned(),
            content: "content".to_owned(),
            user_id: "alice".to_owned(),
            created_at: Utc::now().naive_utc(),
        };
        let viewer = Viewer {
            user_id: "alice".to_owned(),
            role: crate::orm::users::Role::User,
        };
        let comment_ids = vec![BTreeMap::from([("comment_id", Value::from(10i64))])];
        let deleted = MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post]])
            .append_query_results([comment_ids])
            .append_exec_results([
                deleted.clone(),
                deleted.clone(),
                deleted.clone(),
                deleted.clone(),
                deleted,
            ])
            .into_connection();

        delete(&db, 1, &viewer).await.unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1, "cascade must run in one transaction");
        let stmts = format!("{:?}", log);
        assert_eq!(stmts.matches("DELETE FROM").count(), 5);
        for table in ["comment_likes", "comments", "post_likes", "post_tags", "posts"] {
            assert!(stmts.contains(table), "missing delete for {table}");
        }
    }

    #[test]
    fn unrequested_comments_are_omitted_not_empty() {
        let json = serde_json::to_value(a_view(None)).unwrap();
        assert!(json.get("comments").is_none());

        let json = serde_json::to_value(a_view(Some(Vec::new()))).unwrap();
        assert_eq!(json["comments"], serde_json::json!([]));
    }

    #[test]
    fn view_serializes_camel_case() {
        let json = serde_json::to_value(a_view(None)).unwrap();
        assert_eq!(json["postId"], 1);
        assert_eq!(json["authorNickname"], "Alice");
        assert_eq!(json["postedDate"], "2024-01-01T00:00:00");
    }
}
