//! Platform API endpoints (super-admin only)
//!
//! Schools registry and super-admin accounts under `/api/v1/platform`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{School, SuperAdmin};
use crate::services::{CreateSchoolInput, NewSuperAdmin, UpdateSchoolInput};

#[derive(Debug, Serialize)]
pub struct PlatformStatus {
    pub schools: usize,
    pub active_schools: usize,
    pub connected_tenants: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/schools", get(list_schools).post(create_school))
        .route(
            "/schools/{code}",
            get(get_school).put(update_school).delete(deactivate_school),
        )
        .route("/super-admins", get(list_super_admins).post(create_super_admin))
}

/// GET /api/v1/platform/status
async fn status(State(state): State<AppState>) -> Result<Json<PlatformStatus>, ApiError> {
    let schools = state.platform_service.list_schools().await?;
    Ok(Json(PlatformStatus {
        active_schools: schools.iter().filter(|s| s.is_active).count(),
        schools: schools.len(),
        connected_tenants: state.router.connected_count().await,
    }))
}

async fn list_schools(State(state): State<AppState>) -> Result<Json<ListResponse<School>>, ApiError> {
    Ok(Json(state.platform_service.list_schools().await?.into()))
}

/// POST /api/v1/platform/schools
///
/// Connects to and migrates the school database before answering.
async fn create_school(
    State(state): State<AppState>,
    Json(body): Json<CreateSchoolInput>,
) -> Result<(StatusCode, Json<School>), ApiError> {
    let school = state.platform_service.create_school(body).await?;
    tracing::info!("School {} registered", school.code);
    Ok(created(school))
}

async fn get_school(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<School>, ApiError> {
    Ok(Json(state.platform_service.get_school(&code).await?))
}

async fn update_school(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<UpdateSchoolInput>,
) -> Result<Json<School>, ApiError> {
    Ok(Json(state.platform_service.update_school(&code, body).await?))
}

/// DELETE /api/v1/platform/schools/{code}
///
/// Deactivates; the school's data stays in its database.
async fn deactivate_school(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<School>, ApiError> {
    let school = state.platform_service.deactivate_school(&code).await?;
    tracing::info!("School {} deactivated", school.code);
    Ok(Json(school))
}

async fn list_super_admins(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<SuperAdmin>>, ApiError> {
    Ok(Json(state.platform_service.list_super_admins().await?.into()))
}

async fn create_super_admin(
    State(state): State<AppState>,
    Json(body): Json<NewSuperAdmin>,
) -> Result<(StatusCode, Json<SuperAdmin>), ApiError> {
    Ok(created(state.platform_service.create_super_admin(body).await?))
}
