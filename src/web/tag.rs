use crate::db::get_db_pool;
use crate::error::Error;
use crate::guard;
use crate::middleware::ClientCtx;
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(list_tags)
        .service(view_tag)
        .service(create_tag)
        .service(rename_tag)
        .service(destroy_tag);
}

#[derive(Deserialize)]
pub struct TagNameParam {
    pub name: String,
}

#[get("/tags")]
pub async fn list_tags() -> Result<impl Responder, Error> {
    Ok(web::Json(crate::tag::all(get_db_pool()).await?))
}

#[get("/tags/{tag_id}")]
pub async fn view_tag(path: web::Path<i64>) -> Result<impl Responder, Error> {
    Ok(web::Json(crate::tag::get(get_db_pool(), path.into_inner()).await?))
}

#[post("/tags")]
pub async fn create_tag(
    client: ClientCtx,
    params: web::Query<TagNameParam>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    guard::require_admin(&viewer)?;
    let tag = crate::tag::create(get_db_pool(), &params.name).await?;
    Ok(HttpResponse::Created().json(tag))
}

#[patch("/tags/{tag_id}")]
pub async fn rename_tag(
    client: ClientCtx,
    path: web::Path<i64>,
    params: web::Query<TagNameParam>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    guard::require_admin(&viewer)?;
    let tag = crate::tag::rename(get_db_pool(), path.into_inner(), &params.name).await?;
    Ok(web::Json(tag))
}

#[delete("/tags/{tag_id}")]
pub async fn destroy_tag(client: ClientCtx, path: web::Path<i64>) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    guard::require_admin(&viewer)?;
    crate::tag::delete(get_db_pool(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}
