use crate::error::{Error, Result};
use crate::orm::users::Role;
use crate::orm::{post_likes, posts, users};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, SqlErr};
use serde::Serialize;

/// The caller identity resolved for the current request. Anonymous
/// requests carry no Viewer at all; there is no guest sentinel.
#[derive(Clone, Debug)]
pub struct Viewer {
    pub user_id: String,
    pub role: Role,
}

/// Public profile projection. Never exposes email or password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub user_id: String,
    pub nickname: String,
    pub role: Role,
    #[serde(with = "crate::datetime")]
    pub registered_date: NaiveDateTime,
    pub post_ids: Vec<i64>,
}

pub struct NewUser {
    pub user_id: String,
    pub nickname: String,
    pub email: String,
    /// Already hashed by the caller; this module never sees plaintext.
    pub password_hash: String,
}

/// Registers a new account with the default role. The id is caller-chosen
/// and must be free.
pub async fn signup(db: &DatabaseConnection, new_user: NewUser) -> Result<users::Model> {
    if users::Entity::find_by_id(&new_user.user_id)
        .one(db)
        .await?
        .is_some()
    {
        return Err(Error::AlreadyExists("a user with this id already exists"));
    }

    let user = users::ActiveModel {
        user_id: Set(new_user.user_id),
        nickname: Set(new_user.nickname),
        email: Set(new_user.email),
        password: Set(new_user.password_hash),
        role: Set(Role::User),
        created_at: Set(Utc::now().naive_utc()),
    };

    // A concurrent signup winning the insert race hits the primary key;
    // that is the same taxonomy as a failed pre-check, not a server error.
    match user.insert(db).await {
        Ok(user) => Ok(user),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                Err(Error::AlreadyExists("a user with this id already exists"))
            }
            _ => Err(err.into()),
        },
    }
}

pub async fn find<C: ConnectionTrait>(db: &C, user_id: &str) -> Result<users::Model> {
    users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound("user"))
}

async fn post_ids_of(db: &DatabaseConnection, user_id: &str) -> Result<Vec<i64>> {
    Ok(posts::Entity::find()
        .select_only()
        .column(posts::Column::PostId)
        .filter(posts::Column::UserId.eq(user_id))
        .order_by_asc(posts::Column::PostId)
        .into_tuple()
        .all(db)
        .await?)
}

/// Profile projection with the ids of the posts the user authored.
pub async fn get(db: &DatabaseConnection, user_id: &str) -> Result<UserView> {
    let user = find(db, user_id).await?;
    let post_ids = post_ids_of(db, user_id).await?;

    Ok(UserView {
        user_id: user.user_id,
        nickname: user.nickname,
        role: user.role,
        registered_date: user.created_at,
        post_ids,
    })
}

/// Ids of the posts the user authored.
pub async fn authored_post_ids(db: &DatabaseConnection, user_id: &str) -> Result<Vec<i64>> {
    find(db, user_id).await?;
    post_ids_of(db, user_id).await
}

/// Ids of the posts this user currently likes, newest like first.
pub async fn liked_post_ids(db: &DatabaseConnection, user_id: &str) -> Result<Vec<i64>> {
    find(db, user_id).await?;

    Ok(post_likes::Entity::find()
        .select_only()
        .column(post_likes::Column::PostId)
        .filter(post_likes::Column::UserId.eq(user_id))
        .order_by_desc(post_likes::Column::CreatedAt)
        .into_tuple()
        .all(db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn a_user(id: &str) -> users::Model {
        users::Model {
            user_id: id.to_owned(),
            nickname: id.to_owned(),
            email: format!("{id}@example.com"),
            password: "hash".to_owned(),
            role: Role::User,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn new_user(id: &str) -> NewUser {
        NewUser {
            user_id: id.to_owned(),
            nickname: id.to_owned(),
            email: format!("{id}@example.com"),
            password_hash: "hash".to_owned(),
        }
    }

    #[actix_rt::test]
    async fn signup_rejects_a_taken_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![a_user("alice")]])
            .into_connection();

        let err = signup(&db, new_user("alice")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[actix_rt::test]
    async fn authored_posts_of_an_unknown_user_are_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();

        let err = authored_post_ids(&db, "ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound("user")));
    }

    #[actix_rt::test]
    async fn liked_posts_of_an_unknown_user_are_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();

        let err = liked_post_ids(&db, "ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound("user")));
    }
}
