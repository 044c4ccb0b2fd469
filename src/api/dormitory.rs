//! Boarding API endpoints: rooms and bed allocations

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse, OnDate};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::NewRoom;
use crate::models::{BedAllocation, DormRoom};
use crate::services::{AllocateInput, Capability, DormitoryService};

#[derive(Debug, Deserialize)]
pub struct CapacityInput {
    pub capacity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AllocationQuery {
    pub room_id: Option<i64>,
    #[serde(default)]
    pub active: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{id}", get(get_room).delete(delete_room))
        .route("/rooms/{id}/capacity", put(update_capacity))
        .route("/rooms/{id}/allocations", post(allocate))
        .route("/allocations", get(list_allocations))
        .route("/allocations/{id}", get(get_allocation))
        .route("/allocations/{id}/vacate", post(vacate))
}

fn service(ctx: &SchoolContext) -> Result<DormitoryService, ApiError> {
    ctx.require(Capability::ManageDormitory)?;
    Ok(DormitoryService::new(ctx.db()))
}

async fn list_rooms(ctx: SchoolContext) -> Result<Json<ListResponse<DormRoom>>, ApiError> {
    Ok(Json(service(&ctx)?.list_rooms().await?.into()))
}

async fn create_room(
    ctx: SchoolContext,
    Json(body): Json<NewRoom>,
) -> Result<(StatusCode, Json<DormRoom>), ApiError> {
    Ok(created(service(&ctx)?.create_room(body).await?))
}

async fn get_room(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<DormRoom>, ApiError> {
    Ok(Json(service(&ctx)?.get_room(id).await?))
}

/// PUT /schools/{code}/rooms/{id}/capacity
///
/// 409 when more beds are occupied than the new capacity.
async fn update_capacity(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<CapacityInput>,
) -> Result<Json<DormRoom>, ApiError> {
    Ok(Json(service(&ctx)?.update_capacity(id, body.capacity).await?))
}

async fn delete_room(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    service(&ctx)?.delete_room(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn allocate(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<AllocateInput>,
) -> Result<(StatusCode, Json<BedAllocation>), ApiError> {
    Ok(created(service(&ctx)?.allocate(id, body).await?))
}

async fn list_allocations(
    ctx: SchoolContext,
    Query(query): Query<AllocationQuery>,
) -> Result<Json<ListResponse<BedAllocation>>, ApiError> {
    let dormitory = service(&ctx)?;
    Ok(Json(dormitory.list_allocations(query.room_id, query.active).await?.into()))
}

async fn get_allocation(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<BedAllocation>, ApiError> {
    Ok(Json(service(&ctx)?.get_allocation(id).await?))
}

async fn vacate(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    body: Option<Json<OnDate>>,
) -> Result<Json<BedAllocation>, ApiError> {
    let date = body.and_then(|Json(on)| on.date);
    Ok(Json(service(&ctx)?.vacate(id, date).await?))
}
