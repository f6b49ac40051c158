use crate::db::get_db_pool;
use crate::error::Error;
use crate::middleware::ClientCtx;
use crate::query::{self, PostQuery, SortDirection, SortKey};
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_post)
        .service(list_posts)
        .service(create_post)
        .service(update_post)
        .service(destroy_post)
        .service(toggle_post_like)
        .service(view_post_comments)
        .service(create_comment);
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ViewPostParams {
    #[serde(default = "default_true")]
    pub comments: bool,
    #[serde(default = "default_true")]
    pub personalized: bool,
}

#[get("/posts/{post_id}")]
pub async fn view_post(
    client: ClientCtx,
    path: web::Path<i64>,
    params: web::Query<ViewPostParams>,
) -> Result<impl Responder, Error> {
    let viewer = if params.personalized {
        client.user_id()
    } else {
        None
    };
    let view = crate::post::get(
        get_db_pool(),
        path.into_inner(),
        viewer.as_deref(),
        params.comments,
    )
    .await?;
    Ok(web::Json(view))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsParams {
    pub author: Option<String>,
    /// Comma-separated tag ids; unparsable entries are ignored.
    pub tag_ids: Option<String>,
    pub min_date: Option<NaiveDateTime>,
    pub max_date: Option<NaiveDateTime>,
    pub title: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

#[get("/posts")]
pub async fn list_posts(
    client: ClientCtx,
    params: web::Query<ListPostsParams>,
) -> Result<impl Responder, Error> {
    let q = PostQuery {
        author: params.author.clone(),
        tag_ids: params.tag_ids.as_deref().map(parse_id_list),
        min_date: params.min_date,
        max_date: params.max_date,
        title: params.title.clone(),
        sort_by: SortKey::parse(params.sort_by.as_deref()),
        sort_direction: SortDirection::parse(params.sort_direction.as_deref()),
        page: params.page.unwrap_or(0),
        size: params.size.unwrap_or(10),
    };
    let page = query::execute(get_db_pool(), &q, client.user_id().as_deref()).await?;
    Ok(web::Json(page))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

#[post("/posts")]
pub async fn create_post(
    client: ClientCtx,
    form: web::Json<PostRequest>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    let view = crate::post::create(
        get_db_pool(),
        &viewer.user_id,
        &form.title,
        &form.content,
        &form.tag_ids,
    )
    .await?;
    Ok(HttpResponse::Created().json(view))
}

#[patch("/posts/{post_id}")]
pub async fn update_post(
    client: ClientCtx,
    path: web::Path<i64>,
    form: web::Json<PostRequest>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    let view = crate::post::update(
        get_db_pool(),
        path.into_inner(),
        &viewer,
        &form.title,
        &form.content,
        &form.tag_ids,
    )
    .await?;
    Ok(web::Json(view))
}

#[delete("/posts/{post_id}")]
pub async fn destroy_post(client: ClientCtx, path: web::Path<i64>) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    crate::post::delete(get_db_pool(), path.into_inner(), &viewer).await?;
    Ok(HttpResponse::Ok().finish())
}

#[patch("/posts/{post_id}/toggle-like")]
pub async fn toggle_post_like(
    client: ClientCtx,
    path: web::Path<i64>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    let liked = crate::post::toggle_like(get_db_pool(), path.into_inner(), &viewer.user_id).await?;
    Ok(web::Json(json!({ "isLiked": liked })))
}

#[get("/posts/{post_id}/comments")]
pub async fn view_post_comments(
    client: ClientCtx,
    path: web::Path<i64>,
) -> Result<impl Responder, Error> {
    let tree = crate::comment::get_top_level(
        get_db_pool(),
        path.into_inner(),
        client.user_id().as_deref(),
    )
    .await?;
    Ok(web::Json(tree))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentParams {
    pub reply_to: Option<i64>,
}

#[post("/posts/{post_id}/comments")]
pub async fn create_comment(
    client: ClientCtx,
    path: web::Path<i64>,
    params: web::Query<CreateCommentParams>,
    form: web::Json<CommentRequest>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_viewer()?;
    let view = crate::comment::create(
        get_db_pool(),
        path.into_inner(),
        &viewer.user_id,
        &form.content,
        params.reply_to,
    )
    .await?;
    Ok(HttpResponse::Created().json(view))
}
