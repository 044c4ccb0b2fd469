//! Sick bay API endpoints: medication stock, clinic visits, dispensing

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::NewMedication;
use crate::models::{ClinicVisit, Dispensation, Medication};
use crate::services::{Capability, DispenseInput, PharmacyService, VisitInput};

#[derive(Debug, Deserialize)]
pub struct RestockInput {
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitQuery {
    pub student_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/medications", get(list_medications).post(create_medication))
        .route("/medications/low-stock", get(low_stock))
        .route("/medications/{id}", delete(delete_medication))
        .route("/medications/{id}/restock", post(restock))
        .route("/clinic-visits", get(list_visits).post(create_visit))
        .route("/clinic-visits/{id}", get(get_visit))
        .route(
            "/clinic-visits/{id}/dispensations",
            get(list_dispensations).post(dispense),
        )
        .route("/dispensations/{id}", delete(delete_dispensation))
}

fn service(ctx: &SchoolContext) -> Result<PharmacyService, ApiError> {
    ctx.require(Capability::ManagePharmacy)?;
    Ok(PharmacyService::new(ctx.db()))
}

async fn list_medications(ctx: SchoolContext) -> Result<Json<ListResponse<Medication>>, ApiError> {
    Ok(Json(service(&ctx)?.list_medications().await?.into()))
}

async fn create_medication(
    ctx: SchoolContext,
    Json(body): Json<NewMedication>,
) -> Result<(StatusCode, Json<Medication>), ApiError> {
    Ok(created(service(&ctx)?.create_medication(body).await?))
}

/// GET /schools/{code}/medications/low-stock
async fn low_stock(ctx: SchoolContext) -> Result<Json<ListResponse<Medication>>, ApiError> {
    Ok(Json(service(&ctx)?.low_stock().await?.into()))
}

async fn restock(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<RestockInput>,
) -> Result<Json<Medication>, ApiError> {
    Ok(Json(service(&ctx)?.restock(id, body.quantity).await?))
}

async fn delete_medication(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    service(&ctx)?.delete_medication(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_visits(
    ctx: SchoolContext,
    Query(query): Query<VisitQuery>,
) -> Result<Json<ListResponse<ClinicVisit>>, ApiError> {
    Ok(Json(service(&ctx)?.list_visits(query.student_id).await?.into()))
}

async fn create_visit(
    ctx: SchoolContext,
    Json(body): Json<VisitInput>,
) -> Result<(StatusCode, Json<ClinicVisit>), ApiError> {
    let pharmacy = service(&ctx)?;
    Ok(created(pharmacy.create_visit(body, ctx.actor_id()).await?))
}

async fn get_visit(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<ClinicVisit>, ApiError> {
    Ok(Json(service(&ctx)?.get_visit(id).await?))
}

async fn list_dispensations(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<ListResponse<Dispensation>>, ApiError> {
    Ok(Json(service(&ctx)?.list_dispensations(id).await?.into()))
}

/// POST /schools/{code}/clinic-visits/{id}/dispensations
///
/// 409 when the medication does not have enough stock.
async fn dispense(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<DispenseInput>,
) -> Result<(StatusCode, Json<Dispensation>), ApiError> {
    let pharmacy = service(&ctx)?;
    Ok(created(pharmacy.dispense(id, body, ctx.actor_id()).await?))
}

async fn delete_dispensation(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    service(&ctx)?.delete_dispensation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
