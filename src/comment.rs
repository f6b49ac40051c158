//! Comment tree engine: CRUD on comments plus recursive assembly of the
//! per-post reply forest with personalized like state.
//!
//! Assembly is linear in comment count: all comments of a post are loaded
//! flat in one query, a parent -> children index is built once, and the
//! tree is folded out of that index rather than re-queried per node.

use crate::error::{Error, Result};
use crate::guard;
use crate::like::{self, LikeTarget};
use crate::orm::{comment_likes, comments, posts, users};
use crate::user::Viewer;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, FromQueryResult, TransactionTrait};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub comment_id: i64,
    pub post_id: i64,
    pub content: String,
    pub author_user_id: String,
    pub author_nickname: String,
    pub edited: bool,
    pub replies: Vec<CommentView>,
    pub reply_to: Option<i64>,
    pub likes: i64,
    pub is_liked: bool,
    #[serde(with = "crate::datetime")]
    pub commented_date: NaiveDateTime,
}

/// A comment joined with its author's nickname, as loaded from the store.
#[derive(Debug, Clone, FromQueryResult)]
pub struct CommentRow {
    pub comment_id: i64,
    pub content: String,
    pub post_id: i64,
    pub user_id: String,
    pub reply_to_id: Option<i64>,
    pub edited: bool,
    pub created_at: NaiveDateTime,
    pub nickname: String,
}

async fn rows_for_post<C: ConnectionTrait>(db: &C, post_id: i64) -> Result<Vec<CommentRow>> {
    Ok(comments::Entity::find()
        .filter(comments::Column::PostId.eq(post_id))
        .inner_join(users::Entity)
        .column_as(users::Column::Nickname, "nickname")
        .into_model::<CommentRow>()
        .all(db)
        .await?)
}

/// Like counts and the viewer's liked set for every comment in `rows`.
async fn like_data<C: ConnectionTrait>(
    db: &C,
    rows: &[CommentRow],
    viewer: Option<&str>,
) -> Result<(HashMap<i64, i64>, HashSet<i64>)> {
    let ids: Vec<i64> = rows.iter().map(|r| r.comment_id).collect();
    let counts = like::counts_for_comments(db, &ids).await?;
    let liked = like::liked_comments_of(db, &ids, viewer).await?;
    Ok((counts, liked))
}

fn newest_first(rows: &mut [&CommentRow]) {
    rows.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.comment_id.cmp(&a.comment_id))
    });
}

fn index_children(rows: &[CommentRow]) -> (Vec<&CommentRow>, HashMap<i64, Vec<&CommentRow>>) {
    let mut roots: Vec<&CommentRow> = Vec::new();
    let mut children: HashMap<i64, Vec<&CommentRow>> = HashMap::new();
    for row in rows {
        match row.reply_to_id {
            Some(parent) => children.entry(parent).or_default().push(row),
            None => roots.push(row),
        }
    }
    newest_first(&mut roots);
    for kids in children.values_mut() {
        newest_first(kids);
    }
    (roots, children)
}

fn build_node(
    row: &CommentRow,
    children: &HashMap<i64, Vec<&CommentRow>>,
    counts: &HashMap<i64, i64>,
    liked: &HashSet<i64>,
) -> CommentView {
    let replies = children
        .get(&row.comment_id)
        .map(|kids| {
            kids.iter()
                .map(|kid| build_node(kid, children, counts, liked))
                .collect()
        })
        .unwrap_or_default();

    CommentView {
        comment_id: row.comment_id,
        post_id: row.post_id,
        content: row.content.clone(),
        author_user_id: row.user_id.clone(),
        author_nickname: row.nickname.clone(),
        edited: row.edited,
        replies,
        reply_to: row.reply_to_id,
        likes: counts.get(&row.comment_id).copied().unwrap_or(0),
        is_liked: liked.contains(&row.comment_id),
        commented_date: row.created_at,
    }
}

/// Assembles the top-level forest of a post, newest comment first.
/// Terminates because the reply relation is a tree.
fn build_forest(
    rows: &[CommentRow],
    counts: &HashMap<i64, i64>,
    liked: &HashSet<i64>,
) -> Vec<CommentView> {
    let (roots, children) = index_children(rows);
    roots
        .into_iter()
        .map(|row| build_node(row, &children, counts, liked))
        .collect()
}

/// Assembles the subtree rooted at `comment_id`.
fn build_subtree(
    rows: &[CommentRow],
    counts: &HashMap<i64, i64>,
    liked: &HashSet<i64>,
    comment_id: i64,
) -> Option<CommentView> {
    let (_, children) = index_children(rows);
    rows.iter()
        .find(|row| row.comment_id == comment_id)
        .map(|row| build_node(row, &children, counts, liked))
}

/// Ids of `root` and every comment reachable through reply_to pointers.
fn descendant_ids(pairs: &[(i64, Option<i64>)], root: i64) -> Vec<i64> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for (id, parent) in pairs {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*id);
        }
    }
    let mut ids = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        ids.push(id);
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().copied());
        }
    }
    ids
}

/// Top-level comments of the post, each with its assembled reply subtree.
pub async fn get_top_level(
    db: &DatabaseConnection,
    post_id: i64,
    viewer: Option<&str>,
) -> Result<Vec<CommentView>> {
    posts::Entity::find_by_id(post_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound("post"))?;

    let rows = rows_for_post(db, post_id).await?;
    let (counts, liked) = like_data(db, &rows, viewer).await?;
    Ok(build_forest(&rows, &counts, &liked))
}

/// A single comment with its reply subtree.
pub async fn get(
    db: &DatabaseConnection,
    comment_id: i64,
    viewer: Option<&str>,
) -> Result<CommentView> {
    let comment = comments::Entity::find_by_id(comment_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound("comment"))?;

    let rows = rows_for_post(db, comment.post_id).await?;
    let (counts, liked) = like_data(db, &rows, viewer).await?;
    build_subtree(&rows, &counts, &liked, comment_id).ok_or(Error::NotFound("comment"))
}

/// Creates a comment, optionally as a reply. The reply target must exist
/// and belong to the same post; a cross-post target would silently corrupt
/// the tree, so it is rejected outright.
pub async fn create(
    db: &DatabaseConnection,
    post_id: i64,
    author_id: &str,
    content: &str,
    reply_to: Option<i64>,
) -> Result<CommentView> {
    let txn = db.begin().await?;

    let author = users::Entity::find_by_id(author_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound("user"))?;
    posts::Entity::find_by_id(post_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound("post"))?;

    if let Some(reply_to_id) = reply_to {
        let target = comments::Entity::find_by_id(reply_to_id)
            .one(&txn)
            .await?
            .ok_or(Error::NotFound("comment to reply to"))?;
        if target.post_id != post_id {
            return Err(Error::NotFound("comment to reply to in this post"));
        }
    }

    let comment = comments::ActiveModel {
        content: Set(content.to_owned()),
        post_id: Set(post_id),
        user_id: Set(author_id.to_owned()),
        reply_to_id: Set(reply_to),
        edited: Set(false),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    Ok(CommentView {
        comment_id: comment.comment_id,
        post_id: comment.post_id,
        content: comment.content,
        author_user_id: author.user_id,
        author_nickname: author.nickname,
        edited: false,
        replies: Vec::new(),
        reply_to: comment.reply_to_id,
        likes: 0,
        is_liked: false,
        commented_date: comment.created_at,
    })
}

/// Loads the comment and checks the mutation policy against the caller.
pub async fn verify_ownership<C: ConnectionTrait>(
    db: &C,
    comment_id: i64,
    viewer: &Viewer,
) -> Result<comments::Model> {
    let comment = comments::Entity::find_by_id(comment_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound("comment"))?;
    guard::require_owner(&comment.user_id, viewer)?;
    Ok(comment)
}

/// Replaces the comment body. Any successful update marks the comment as
/// edited; the flag never goes back.
pub async fn update(
    db: &DatabaseConnection,
    comment_id: i64,
    viewer: &Viewer,
    content: &str,
) -> Result<CommentView> {
    let txn = db.begin().await?;

    let comment = verify_ownership(&txn, comment_id, viewer).await?;

    let mut comment: comments::ActiveModel = comment.into();
    comment.content = Set(content.to_owned());
    comment.edited = Set(true);
    comment.update(&txn).await?;

    txn.commit().await?;

    get(db, comment_id, Some(&viewer.user_id)).await
}

/// Deletes the comment together with every descendant reply and all like
/// facts referencing them, in one transaction.
pub async fn delete(db: &DatabaseConnection, comment_id: i64, viewer: &Viewer) -> Result<()> {
    let txn = db.begin().await?;

    let comment = verify_ownership(&txn, comment_id, viewer).await?;

    let pairs: Vec<(i64, Option<i64>)> = comments::Entity::find()
        .select_only()
        .column(comments::Column::CommentId)
        .column(comments::Column::ReplyToId)
        .filter(comments::Column::PostId.eq(comment.post_id))
        .into_tuple()
        .all(&txn)
        .await?;
    let doomed = descendant_ids(&pairs, comment_id);

    comment_likes::Entity::delete_many()
        .filter(comment_likes::Column::CommentId.is_in(doomed.clone()))
        .exec(&txn)
        .await?;
    comments::Entity::delete_many()
        .filter(comments::Column::CommentId.is_in(doomed))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(())
}

/// Flips the caller's like on the comment and returns the new state.
pub async fn toggle_like(db: &DatabaseConnection, comment_id: i64, user_id: &str) -> Result<bool> {
    like::toggle(db, LikeTarget::Comment(comment_id), user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap()
    }

    fn row(comment_id: i64, reply_to_id: Option<i64>, minute: u32) -> CommentRow {
        CommentRow {
            comment_id,
            content: format!("comment {comment_id}"),
            post_id: 7,
            user_id: "alice".to_owned(),
            reply_to_id,
            edited: false,
            created_at: at(minute),
            nickname: "Alice".to_owned(),
        }
    }

    #[test]
    fn forest_orders_roots_and_replies_newest_first() {
        // post 7: two roots, the older root has three replies.
        let rows = vec![
            row(1, None, 0),
            row(2, Some(1), 1),
            row(3, Some(1), 3),
            row(4, Some(1), 2),
            row(5, None, 4),
        ];
        let forest = build_forest(&rows, &HashMap::new(), &HashSet::new());

        let root_ids: Vec<i64> = forest.iter().map(|c| c.comment_id).collect();
        assert_eq!(root_ids, vec![5, 1]);

        let reply_ids: Vec<i64> = forest[1].replies.iter().map(|c| c.comment_id).collect();
        assert_eq!(reply_ids, vec![3, 4, 2]);
        assert!(forest[1]
            .replies
            .iter()
            .all(|reply| reply.reply_to == Some(1)));
    }

    #[test]
    fn equal_timestamps_fall_back_to_id_order() {
        let rows = vec![row(1, None, 0), row(2, None, 0), row(3, None, 0)];
        let forest = build_forest(&rows, &HashMap::new(), &HashSet::new());
        let ids: Vec<i64> = forest.iter().map(|c| c.comment_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn like_state_lands_on_the_right_nodes() {
        let rows = vec![row(1, None, 0), row(2, Some(1), 1)];
        let counts = HashMap::from([(2, 5)]);
        let liked = HashSet::from([2]);
        let forest = build_forest(&rows, &counts, &liked);

        assert_eq!(forest[0].likes, 0);
        assert!(!forest[0].is_liked);
        let reply = &forest[0].replies[0];
        assert_eq!(reply.likes, 5);
        assert!(reply.is_liked);
    }

    #[test]
    fn subtree_is_rooted_at_the_requested_comment() {
        let rows = vec![row(1, None, 0), row(2, Some(1), 1), row(3, Some(2), 2)];
        let node = build_subtree(&rows, &HashMap::new(), &HashSet::new(), 2).unwrap();
        assert_eq!(node.comment_id, 2);
        assert_eq!(node.replies.len(), 1);
        assert_eq!(node.replies[0].comment_id, 3);

        assert!(build_subtree(&rows, &HashMap::new(), &HashSet::new(), 404).is_none());
    }

    #[test]
    fn descendants_cover_the_whole_subtree_and_nothing_else() {
        let pairs = vec![
            (1, None),
            (2, Some(1)),
            (3, Some(2)),
            (4, Some(1)),
            (5, None),
            (6, Some(5)),
        ];
        let mut ids = descendant_ids(&pairs, 1);
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    fn a_comment(comment_id: i64, reply_to_id: Option<i64>) -> comments::Model {
        comments::Model {
            comment_id,
            content: "body".to_owned(),
            post_id: 7,
            user_id: "alice".to_owned(),
            reply_to_id,
            edited: false,
            created_at: at(0),
        }
    }

    fn a_viewer(id: &str) -> Viewer {
        Viewer {
            user_id: id.to_owned(),
            role: crate::orm::users::Role::User,
        }
    }

    fn a_comment_row(model: &comments::Model) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("comment_id", Value::from(model.comment_id)),
            ("content", Value::from(model.content.clone())),
            ("post_id", Value::from(model.post_id)),
            ("user_id", Value::from(model.user_id.clone())),
            (
                "reply_to_id",
                model
                    .reply_to_id
                    .map(Value::from)
                    .unwrap_or(Value::BigInt(None)),
            ),
            ("edited", Value::from(model.edited)),
            ("created_at", Value::from(model.created_at)),
            ("nickname", Value::from("Alice")),
        ])
    }

    #[actix_rt::test]
    async fn update_checks_ownership_and_writes_in_one_transaction() {
        let existing = a_comment(1, None);
        let mut updated = existing.clone();
        updated.content = "new".to_owned();
        updated.edited = true;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing]])
            .append_query_results([vec![updated.clone()]])
            .append_query_results([vec![updated.clone()]])
            .append_query_results([vec![a_comment_row(&updated)]])
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();

        let view = update(&db, 1, &a_viewer("alice"), "new").await.unwrap();
        assert_eq!(view.content, "new");
        assert!(view.edited);

        // The ownership check and the write are one log entry (one
        // transaction); the re-read afterwards runs as four plain queries.
        let log = db.into_transaction_log();
        assert_eq!(log.len(), 5);
    }

    #[actix_rt::test]
    async fn delete_cascades_over_replies_and_their_likes_in_one_transaction() {
        let root = a_comment(1, None);
        let pairs = vec![
            BTreeMap::from([
                ("comment_id", Value::from(1i64)),
                ("reply_to_id", Value::BigInt(None)),
            ]),
            BTreeMap::from([
                ("comment_id", Value::from(2i64)),
                ("reply_to_id", Value::from(1i64)),
            ]),
        ];

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![root]])
            .append_query_results([pairs])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .into_connection();

        delete(&db, 1, &a_viewer("alice")).await.unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1, "cascade must run in one transaction");
        let stmts = format!("{:?}", log);
        assert_eq!(stmts.matches("DELETE FROM").count(), 2);
        assert!(stmts.contains("comment_likes"));
    }

    #[test]
    fn view_serializes_camel_case_with_wire_timestamps() {
        let view = build_forest(
            &[row(1, None, 30)],
            &HashMap::new(),
            &HashSet::new(),
        )
        .remove(0);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["commentId"], 1);
        assert_eq!(json["authorUserId"], "alice");
        assert_eq!(json["isLiked"], false);
        assert_eq!(json["commentedDate"], "2024-01-01T12:30:00");
    }
}
