//! Notice board API endpoints

use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::NewNotice;
use crate::models::Notice;
use crate::services::{Capability, NoticeService};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notices", get(list_notices).post(create_notice))
        .route("/notices/{id}", get(get_notice).delete(delete_notice))
}

/// GET /schools/{code}/notices
///
/// Only notices addressed to the caller's role.
async fn list_notices(ctx: SchoolContext) -> Result<Json<ListResponse<Notice>>, ApiError> {
    ctx.require(Capability::ReadNotices)?;
    Ok(Json(NoticeService::new(ctx.db()).list_for(ctx.claims.role).await?.into()))
}

async fn create_notice(
    ctx: SchoolContext,
    Json(body): Json<NewNotice>,
) -> Result<(StatusCode, Json<Notice>), ApiError> {
    ctx.require(Capability::PostNotices)?;
    Ok(created(NoticeService::new(ctx.db()).create(body, ctx.actor_id()).await?))
}

async fn get_notice(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<Notice>, ApiError> {
    ctx.require(Capability::ReadNotices)?;
    Ok(Json(NoticeService::new(ctx.db()).get_for(id, ctx.claims.role).await?))
}

async fn delete_notice(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    ctx.require(Capability::PostNotices)?;
    NoticeService::new(ctx.db()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
