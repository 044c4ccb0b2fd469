//! Website management API endpoints
//!
//! Content edited here is what `/s/{code}` and `/api/v1/public/{code}/site`
//! serve. Saving settings drops the school's cached site data.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::NewGalleryItem;
use crate::models::{ArticleStatus, GalleryItem, NewsArticle, SiteSettings};
use crate::services::{ArticleInput, ArticleView, Capability, WebsiteService};

#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    pub status: Option<ArticleStatus>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/website/settings", get(get_settings).put(update_settings))
        .route("/website/articles", get(list_articles).post(create_article))
        .route(
            "/website/articles/{id}",
            get(get_article).put(update_article).delete(delete_article),
        )
        .route("/website/gallery", get(list_gallery).post(create_gallery_item))
        .route("/website/gallery/{id}", delete(delete_gallery_item))
}

fn service(state: &AppState, ctx: &SchoolContext) -> Result<WebsiteService, ApiError> {
    ctx.require(Capability::ManageWebsite)?;
    Ok(WebsiteService::new(&ctx.tenant, state.cache.clone()))
}

async fn get_settings(
    State(state): State<AppState>,
    ctx: SchoolContext,
) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(service(&state, &ctx)?.settings().await?))
}

/// PUT /schools/{code}/website/settings
///
/// Body is a flat object of setting keys; unknown keys are rejected.
async fn update_settings(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Json(body): Json<HashMap<String, String>>,
) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(service(&state, &ctx)?.update_settings(body).await?))
}

async fn list_articles(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Query(query): Query<ArticleQuery>,
) -> Result<Json<ListResponse<NewsArticle>>, ApiError> {
    Ok(Json(service(&state, &ctx)?.list_articles(query.status).await?.into()))
}

async fn create_article(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Json(body): Json<ArticleInput>,
) -> Result<(StatusCode, Json<ArticleView>), ApiError> {
    let website = service(&state, &ctx)?;
    Ok(created(website.create_article(body, ctx.actor_id()).await?))
}

async fn get_article(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<ArticleView>, ApiError> {
    Ok(Json(service(&state, &ctx)?.get_article(id).await?))
}

async fn update_article(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<ArticleInput>,
) -> Result<Json<ArticleView>, ApiError> {
    Ok(Json(service(&state, &ctx)?.update_article(id, body).await?))
}

async fn delete_article(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    service(&state, &ctx)?.delete_article(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_gallery(
    State(state): State<AppState>,
    ctx: SchoolContext,
) -> Result<Json<ListResponse<GalleryItem>>, ApiError> {
    Ok(Json(service(&state, &ctx)?.list_gallery().await?.into()))
}

async fn create_gallery_item(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Json(body): Json<NewGalleryItem>,
) -> Result<(StatusCode, Json<GalleryItem>), ApiError> {
    Ok(created(service(&state, &ctx)?.create_gallery_item(body).await?))
}

async fn delete_gallery_item(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    service(&state, &ctx)?.delete_gallery_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
