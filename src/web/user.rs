use crate::db::get_db_pool;
use crate::error::Error;
use crate::middleware::ClientCtx;
use actix_web::{get, web, Responder};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_user)
        .service(view_authored_posts)
        .service(view_liked_posts);
}

#[get("/users/{user_id}")]
pub async fn view_user(path: web::Path<String>) -> Result<impl Responder, Error> {
    Ok(web::Json(crate::user::get(get_db_pool(), &path.into_inner()).await?))
}

/// Posts the user authored, newest first, projected the same way as the
/// post listing.
#[get("/users/{user_id}/posts")]
pub async fn view_authored_posts(
    client: ClientCtx,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let post_ids = crate::user::authored_post_ids(db, &path.into_inner()).await?;
    let views = crate::post::views_for_ids(db, &post_ids, client.user_id().as_deref()).await?;
    Ok(web::Json(views))
}

/// Posts the user has liked, projected the same way as the post listing.
#[get("/users/{user_id}/liked-posts")]
pub async fn view_liked_posts(
    client: ClientCtx,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let post_ids = crate::user::liked_post_ids(db, &path.into_inner()).await?;
    let views = crate::post::views_for_ids(db, &post_ids, client.user_id().as_deref()).await?;
    Ok(web::Json(views))
}
