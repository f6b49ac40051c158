//! Tag catalog. Tags live independently of posts; deleting a tag detaches
//! it from every post without touching the posts.

use crate::error::{Error, Result};
use crate::orm::{post_tags, tags};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, FromQueryResult, TransactionTrait};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct TagView {
    pub tag_id: i64,
    pub name: String,
}

impl From<tags::Model> for TagView {
    fn from(tag: tags::Model) -> Self {
        Self {
            tag_id: tag.tag_id,
            name: tag.name,
        }
    }
}

/// Case-insensitive match on the tag name.
fn name_matches(name: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(tags::Column::Name))).eq(name.trim().to_lowercase())
}

pub async fn all(db: &DatabaseConnection) -> Result<Vec<TagView>> {
    let rows = tags::Entity::find()
        .order_by_asc(tags::Column::TagId)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(TagView::from).collect())
}

pub async fn get(db: &DatabaseConnection, tag_id: i64) -> Result<TagView> {
    tags::Entity::find_by_id(tag_id)
        .one(db)
        .await?
        .map(TagView::from)
        .ok_or(Error::NotFound("tag"))
}

pub async fn create(db: &DatabaseConnection, name: &str) -> Result<TagView> {
    let collision = tags::Entity::find().filter(name_matches(name)).one(db).await?;
    if collision.is_some() {
        return Err(Error::AlreadyExists("a tag with this name already exists"));
    }

    let tag = tags::ActiveModel {
        name: Set(name.trim().to_owned()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(tag.into())
}

/// Renames a tag. The uniqueness check applies here exactly as on create;
/// renaming a tag to its own name (any casing) is allowed.
pub async fn rename(db: &DatabaseConnection, tag_id: i64, new_name: &str) -> Result<TagView> {
    let tag = tags::Entity::find_by_id(tag_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound("tag"))?;

    let collision = tags::Entity::find()
        .filter(name_matches(new_name))
        .filter(tags::Column::TagId.ne(tag_id))
        .one(db)
        .await?;
    if collision.is_some() {
        return Err(Error::AlreadyExists("a tag with this name already exists"));
    }

    let mut tag: tags::ActiveModel = tag.into();
    tag.name = Set(new_name.trim().to_owned());
    Ok(tag.update(db).await?.into())
}

/// Detaches the tag from all posts and removes it, in one transaction.
pub async fn delete(db: &DatabaseConnection, tag_id: i64) -> Result<()> {
    let txn = db.begin().await?;

    let tag = tags::Entity::find_by_id(tag_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound("tag"))?;

    post_tags::Entity::delete_many()
        .filter(post_tags::Column::TagId.eq(tag_id))
        .exec(&txn)
        .await?;
    tag.delete(&txn).await?;

    txn.commit().await?;
    Ok(())
}

/// Best-effort lookup used when attaching tags to a post: unknown ids are
/// dropped silently, not an error.
pub async fn resolve_many<C: ConnectionTrait>(db: &C, tag_ids: &[i64]) -> Result<Vec<tags::Model>> {
    if tag_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(tags::Entity::find()
        .filter(tags::Column::TagId.is_in(tag_ids.to_vec()))
        .all(db)
        .await?)
}

/// Tag sets for a batch of posts, one joined query.
pub async fn tags_of_posts<C: ConnectionTrait>(
    db: &C,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<TagView>>> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, i64, String)> = post_tags::Entity::find()
        .select_only()
        .column(post_tags::Column::PostId)
        .column(tags::Column::TagId)
        .column(tags::Column::Name)
        .inner_join(tags::Entity)
        .filter(post_tags::Column::PostId.is_in(post_ids.to_vec()))
        .order_by_asc(tags::Column::TagId)
        .into_tuple()
        .all(db)
        .await?;

    let mut map: HashMap<i64, Vec<TagView>> = HashMap::new();
    for (post_id, tag_id, name) in rows {
        map.entry(post_id).or_default().push(TagView { tag_id, name });
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn a_tag(id: i64, name: &str) -> tags::Model {
        tags::Model {
            tag_id: id,
            name: name.to_owned(),
        }
    }

    #[actix_rt::test]
    async fn create_rejects_duplicate_names_case_insensitively() {
        // "Tech" exists; creating "tech" must collide.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![a_tag(1, "Tech")]])
            .into_connection();

        let err = create(&db, "tech").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[actix_rt::test]
    async fn rename_applies_the_same_uniqueness_check() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![a_tag(2, "News")]])
            .append_query_results([vec![a_tag(1, "Tech")]])
            .into_connection();

        let err = rename(&db, 2, "TECH").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[actix_rt::test]
    async fn rename_of_unknown_tag_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<tags::Model>::new()])
            .into_connection();

        let err = rename(&db, 404, "whatever").await.unwrap_err();
        assert!(matches!(err, Error::NotFound("tag")));
    }

    #[actix_rt::test]
    async fn resolve_many_drops_unknown_ids() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![a_tag(1, "Tech")]])
            .into_connection();

        let found = resolve_many(&db, &[1, 999]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag_id, 1);
    }
}
