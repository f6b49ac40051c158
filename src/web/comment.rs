use crate::db::get_db_pool;
use crate::error::Error;
use crate::middleware::ClientCtx;
use actix_web::{delete, get, patch, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_comment)
        .service(update_comment)
        .service(destroy_comment)
        .service(toggle_comment_like);
}

#[get("/comments/{comment_id}")]
pub async fn view_comment(client: ClientCtx, path: web::Path<i64>) -> Result<impl Responder, Error> {
    let view = crate::comment::get(
        get_db_pool(),
        path.into_inner(),
        client.user_id().as_deref(),
    )
    .await?;
    Ok(web::Json(view))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[patch("/comments/{comment_id}")]
pub async fn update_comment(
    client: ClientCtx,
    path: web::Path<i64>,
    form: web::Json<CommentRequest>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    let view =
        crate::comment::update(get_db_pool(), path.into_inner(), &viewer, &form.content).await?;
    Ok(web::Json(view))
}

#[delete("/comments/{comment_id}")]
pub async fn destroy_comment(
    client: ClientCtx,
    path: web::Path<i64>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    crate::comment::delete(get_db_pool(), path.into_inner(), &viewer).await?;
    Ok(HttpResponse::Ok().finish())
}

#[patch("/comments/{comment_id}/toggle-like")]
pub async fn toggle_comment_like(
    client: ClientCtx,
    path: web::Path<i64>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    let liked =
        crate::comment::toggle_like(get_db_pool(), path.into_inner(), &viewer.user_id).await?;
    Ok(web::Json(json!({ "isLiked": liked })))
}
