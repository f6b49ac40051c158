//! Like ledger for posts and comments. A like is a row keyed on
//! (user, target); presence of the row is the entire like state.

use crate::error::{Error, Result};
use crate::orm::{comment_likes, comments, post_likes, posts, users};
use chrono::Utc;
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, SqlErr, TransactionTrait};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeTarget {
    Post(i64),
    Comment(i64),
}

impl LikeTarget {
    fn entity_name(self) -> &'static str {
        match self {
            LikeTarget::Post(_) => "post",
            LikeTarget::Comment(_) => "comment",
        }
    }
}

/// Flips the like state for (user, target) and returns the new state:
/// true if the target is now liked, false if the like was removed.
///
/// Runs in a single transaction. A concurrent toggle losing the insert
/// race hits the composite-key constraint; that is resolved as "already
/// liked" instead of surfacing an error.
pub async fn toggle(db: &DatabaseConnection, target: LikeTarget, user_id: &str) -> Result<bool> {
    let txn = db.begin().await?;

    users::Entity::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound("user"))?;

    let liked = match target {
        LikeTarget::Post(post_id) => {
            posts::Entity::find_by_id(post_id)
                .one(&txn)
                .await?
                .ok_or(Error::NotFound(target.entity_name()))?;

            let existing = post_likes::Entity::find_by_id((user_id.to_owned(), post_id))
                .one(&txn)
                .await?;
            match existing {
                Some(row) => {
                    row.delete(&txn).await?;
                    false
                }
                None => {
                    let row = post_likes::ActiveModel {
                        user_id: Set(user_id.to_owned()),
                        post_id: Set(post_id),
                        created_at: Set(Utc::now().naive_utc()),
                    };
                    insert_like(post_likes::Entity::insert(row), &txn).await?
                }
            }
        }
        LikeTarget::Comment(comment_id) => {
            comments::Entity::find_by_id(comment_id)
                .one(&txn)
                .await?
                .ok_or(Error::NotFound(target.entity_name()))?;

            let existing = comment_likes::Entity::find_by_id((user_id.to_owned(), comment_id))
                .one(&txn)
                .await?;
            match existing {
                Some(row) => {
                    row.delete(&txn).await?;
                    false
                }
                None => {
                    let row = comment_likes::ActiveModel {
                        user_id: Set(user_id.to_owned()),
                        comment_id: Set(comment_id),
                        created_at: Set(Utc::now().naive_utc()),
                    };
                    insert_like(comment_likes::Entity::insert(row), &txn).await?
                }
            }
        }
    };

    txn.commit().await?;
    Ok(liked)
}

/// Inserts a like row. A unique-constraint violation means a concurrent
/// toggle inserted the same fact first; the pair is liked either way.
async fn insert_like<A, C>(insert: Insert<A>, db: &C) -> Result<bool>
where
    A: ActiveModelTrait,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    C: ConnectionTrait,
{
    match insert.exec_without_returning(db).await {
        Ok(_) => Ok(true),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Ok(true),
            _ => Err(err.into()),
        },
    }
}

/// Number of like facts for the target. Missing targets count zero.
pub async fn count<C: ConnectionTrait>(db: &C, target: LikeTarget) -> Result<i64> {
    let n = match target {
        LikeTarget::Post(post_id) => {
            post_likes::Entity::find()
                .filter(post_likes::Column::PostId.eq(post_id))
                .count(db)
                .await?
        }
        LikeTarget::Comment(comment_id) => {
            comment_likes::Entity::find()
                .filter(comment_likes::Column::CommentId.eq(comment_id))
                .count(db)
                .await?
        }
    };
    Ok(n as i64)
}

/// Personalization query; anonymous viewers never like anything.
pub async fn has_liked<C: ConnectionTrait>(
    db: &C,
    target: LikeTarget,
    viewer: Option<&str>,
) -> Result<bool> {
    let Some(user_id) = viewer else {
        return Ok(false);
    };
    let row = match target {
        LikeTarget::Post(post_id) => post_likes::Entity::find_by_id((user_id.to_owned(), post_id))
            .one(db)
            .await?
            .map(|_| ()),
        LikeTarget::Comment(comment_id) => {
            comment_likes::Entity::find_by_id((user_id.to_owned(), comment_id))
                .one(db)
                .await?
                .map(|_| ())
        }
    };
    Ok(row.is_some())
}

/// Like counts for a batch of posts, one grouped query.
pub async fn counts_for_posts<C: ConnectionTrait>(
    db: &C,
    post_ids: &[i64],
) -> Result<HashMap<i64, i64>> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, i64)> = post_likes::Entity::find()
        .select_only()
        .column(post_likes::Column::PostId)
        .column_as(post_likes::Column::UserId.count(), "likes")
        .filter(post_likes::Column::PostId.is_in(post_ids.to_vec()))
        .group_by(post_likes::Column::PostId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Like counts for a batch of comments, one grouped query.
pub async fn counts_for_comments<C: ConnectionTrait>(
    db: &C,
    comment_ids: &[i64],
) -> Result<HashMap<i64, i64>> {
    if comment_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, i64)> = comment_likes::Entity::find()
        .select_only()
        .column(comment_likes::Column::CommentId)
        .column_as(comment_likes::Column::UserId.count(), "likes")
        .filter(comment_likes::Column::CommentId.is_in(comment_ids.to_vec()))
        .group_by(comment_likes::Column::CommentId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Which of the given posts the viewer has liked. Empty for anonymous.
pub async fn liked_posts_of<C: ConnectionTrait>(
    db: &C,
    post_ids: &[i64],
    viewer: Option<&str>,
) -> Result<HashSet<i64>> {
    let Some(user_id) = viewer else {
        return Ok(HashSet::new());
    };
    if post_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let rows: Vec<i64> = post_likes::Entity::find()
        .select_only()
        .column(post_likes::Column::PostId)
        .filter(post_likes::Column::UserId.eq(user_id))
        .filter(post_likes::Column::PostId.is_in(post_ids.to_vec()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Which of the given comments the viewer has liked. Empty for anonymous.
pub async fn liked_comments_of<C: ConnectionTrait>(
    db: &C,
    comment_ids: &[i64],
    viewer: Option<&str>,
) -> Result<HashSet<i64>> {
    let Some(user_id) = viewer else {
        return Ok(HashSet::new());
    };
    if comment_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let rows: Vec<i64> = comment_likes::Entity::find()
        .select_only()
        .column(comment_likes::Column::CommentId)
        .filter(comment_likes::Column::UserId.eq(user_id))
        .filter(comment_likes::Column::CommentId.is_in(comment_ids.to_vec()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}
