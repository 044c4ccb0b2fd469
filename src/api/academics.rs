//! Academic structure API endpoints: years, terms, classes, subjects

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::{NewAcademicYear, NewClass, NewSubject, NewTerm};
use crate::models::{AcademicYear, SchoolClass, Subject, Term};
use crate::services::{AcademicsService, Capability};

#[derive(Debug, Deserialize)]
pub struct TermQuery {
    pub academic_year_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/academic-years", get(list_years).post(create_year))
        .route("/academic-years/{id}", delete(delete_year))
        .route("/academic-years/{id}/activate", post(activate_year))
        .route("/terms", get(list_terms).post(create_term))
        .route("/terms/active", get(active_term))
        .route("/terms/{id}", delete(delete_term))
        .route("/terms/{id}/activate", post(activate_term))
        .route("/classes", get(list_classes).post(create_class))
        .route("/classes/{id}", delete(delete_class))
        .route("/subjects", get(list_subjects).post(create_subject))
        .route("/subjects/{id}", delete(delete_subject))
}

fn service(ctx: &SchoolContext, capability: Capability) -> Result<AcademicsService, ApiError> {
    ctx.require(capability)?;
    Ok(AcademicsService::new(ctx.db()))
}

// Academic years

async fn list_years(ctx: SchoolContext) -> Result<Json<ListResponse<AcademicYear>>, ApiError> {
    let academics = service(&ctx, Capability::ViewAcademics)?;
    Ok(Json(academics.list_years().await?.into()))
}

async fn create_year(
    ctx: SchoolContext,
    Json(body): Json<NewAcademicYear>,
) -> Result<(StatusCode, Json<AcademicYear>), ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    Ok(created(academics.create_year(body).await?))
}

/// POST /schools/{code}/academic-years/{id}/activate
async fn activate_year(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<AcademicYear>, ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    Ok(Json(academics.activate_year(id).await?))
}

async fn delete_year(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    academics.delete_year(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Terms

async fn list_terms(
    ctx: SchoolContext,
    Query(query): Query<TermQuery>,
) -> Result<Json<ListResponse<Term>>, ApiError> {
    let academics = service(&ctx, Capability::ViewAcademics)?;
    Ok(Json(academics.list_terms(query.academic_year_id).await?.into()))
}

async fn create_term(
    ctx: SchoolContext,
    Json(body): Json<NewTerm>,
) -> Result<(StatusCode, Json<Term>), ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    Ok(created(academics.create_term(body).await?))
}

async fn active_term(ctx: SchoolContext) -> Result<Json<Term>, ApiError> {
    let academics = service(&ctx, Capability::ViewAcademics)?;
    Ok(Json(academics.active_term().await?))
}

async fn activate_term(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<Term>, ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    Ok(Json(academics.activate_term(id).await?))
}

async fn delete_term(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    academics.delete_term(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Classes

async fn list_classes(ctx: SchoolContext) -> Result<Json<ListResponse<SchoolClass>>, ApiError> {
    let academics = service(&ctx, Capability::ViewAcademics)?;
    Ok(Json(academics.list_classes().await?.into()))
}

async fn create_class(
    ctx: SchoolContext,
    Json(body): Json<NewClass>,
) -> Result<(StatusCode, Json<SchoolClass>), ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    Ok(created(academics.create_class(body).await?))
}

async fn delete_class(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    academics.delete_class(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Subjects

async fn list_subjects(ctx: SchoolContext) -> Result<Json<ListResponse<Subject>>, ApiError> {
    let academics = service(&ctx, Capability::ViewAcademics)?;
    Ok(Json(academics.list_subjects().await?.into()))
}

async fn create_subject(
    ctx: SchoolContext,
    Json(body): Json<NewSubject>,
) -> Result<(StatusCode, Json<Subject>), ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    Ok(created(academics.create_subject(body).await?))
}

async fn delete_subject(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let academics = service(&ctx, Capability::ManageAcademics)?;
    academics.delete_subject(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
