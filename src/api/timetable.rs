//! Timetable API endpoints

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::NewSlot;
use crate::models::TimetableSlot;
use crate::services::{Capability, TimetableService};

#[derive(Debug, Default, Deserialize)]
pub struct SlotQuery {
    pub class_id: Option<i64>,
    pub teacher_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/timetable", get(list_slots).post(create_slot))
        .route("/timetable/{id}", get(get_slot).delete(delete_slot))
}

async fn list_slots(
    ctx: SchoolContext,
    Query(query): Query<SlotQuery>,
) -> Result<Json<ListResponse<TimetableSlot>>, ApiError> {
    ctx.require(Capability::ViewTimetable)?;
    let slots = TimetableService::new(ctx.db())
        .list(query.class_id, query.teacher_id)
        .await?;
    Ok(Json(slots.into()))
}

/// POST /schools/{code}/timetable
///
/// 409 when the slot overlaps another one of the same class or teacher.
async fn create_slot(
    ctx: SchoolContext,
    Json(body): Json<NewSlot>,
) -> Result<(StatusCode, Json<TimetableSlot>), ApiError> {
    ctx.require(Capability::ManageTimetable)?;
    Ok(created(TimetableService::new(ctx.db()).create(body).await?))
}

async fn get_slot(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<TimetableSlot>, ApiError> {
    ctx.require(Capability::ViewTimetable)?;
    Ok(Json(TimetableService::new(ctx.db()).get(id).await?))
}

async fn delete_slot(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    ctx.require(Capability::ManageTimetable)?;
    TimetableService::new(ctx.db()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
