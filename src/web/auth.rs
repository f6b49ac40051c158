use crate::db::get_db_pool;
use crate::error::Error;
use crate::middleware::SESSION_USER_KEY;
use crate::orm::users;
use crate::user::{self, NewUser};
use actix_session::Session;
use actix_web::{post, web, HttpResponse, Responder};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use sea_orm::{entity::*, query::*};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(signup).service(login).service(logout);
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub nickname: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[post("/auth/signup")]
pub async fn signup(form: web::Json<SignupRequest>) -> Result<impl Responder, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(form.password.as_bytes(), &salt)
        .map_err(|err| {
            log::error!("signup: password hashing failed: {}", err);
            Error::Internal("could not hash password")
        })?;

    let created = user::signup(
        get_db_pool(),
        NewUser {
            user_id: form.username.clone(),
            nickname: form.nickname.clone(),
            email: form.email.clone(),
            password_hash: hash.to_string(),
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({ "userId": created.user_id })))
}

#[post("/auth/login")]
pub async fn login(
    session: Session,
    form: web::Json<LoginRequest>,
) -> Result<impl Responder, Error> {
    let account = users::Entity::find_by_id(&form.username)
        .one(get_db_pool())
        .await?
        .ok_or(Error::AuthenticationFailed)?;

    // A malformed stored hash can never verify, so both cases collapse
    // into the same failure the caller sees.
    let parsed = PasswordHash::new(&account.password).map_err(|_| Error::AuthenticationFailed)?;
    Argon2::default()
        .verify_password(form.password.as_bytes(), &parsed)
        .map_err(|_| Error::AuthenticationFailed)?;

    session.renew();
    session
        .insert(SESSION_USER_KEY, account.user_id.clone())
        .map_err(|err| {
            log::error!("login: session write failed: {}", err);
            Error::Internal("could not start session")
        })?;

    Ok(web::Json(json!({ "userId": account.user_id })))
}

#[post("/auth/logout")]
pub async fn logout(session: Session) -> Result<impl Responder, Error> {
    session.purge();
    Ok(HttpResponse::Ok().finish())
}
