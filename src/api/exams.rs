//! Exam, marks and results API endpoints

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::NewExam;
use crate::models::{Exam, Mark, StudentResult};
use crate::services::{Capability, ExamService, MarksInput};

#[derive(Debug, Deserialize)]
pub struct ExamQuery {
    pub term_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ClassQuery {
    pub class_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MarksRecorded {
    pub recorded: usize,
}

#[derive(Debug, Serialize)]
pub struct ResultSheet {
    pub exam: Exam,
    pub class_id: Option<i64>,
    pub results: Vec<StudentResult>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/exams", get(list_exams).post(create_exam))
        .route("/exams/{id}", get(get_exam).delete(delete_exam))
        .route("/exams/{id}/marks", get(list_marks).put(record_marks))
        .route("/exams/{id}/results", get(results))
}

async fn list_exams(
    ctx: SchoolContext,
    Query(query): Query<ExamQuery>,
) -> Result<Json<ListResponse<Exam>>, ApiError> {
    ctx.require(Capability::ViewAcademics)?;
    Ok(Json(ExamService::new(ctx.db()).list(query.term_id).await?.into()))
}

async fn create_exam(
    ctx: SchoolContext,
    Json(body): Json<NewExam>,
) -> Result<(StatusCode, Json<Exam>), ApiError> {
    ctx.require(Capability::ManageExams)?;
    Ok(created(ExamService::new(ctx.db()).create(body).await?))
}

async fn get_exam(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<Exam>, ApiError> {
    ctx.require(Capability::ViewAcademics)?;
    Ok(Json(ExamService::new(ctx.db()).get(id).await?))
}

async fn delete_exam(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    ctx.require(Capability::ManageExams)?;
    ExamService::new(ctx.db()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /schools/{code}/exams/{id}/marks
///
/// Re-submitting a subject overwrites the earlier scores.
async fn record_marks(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<MarksInput>,
) -> Result<Json<MarksRecorded>, ApiError> {
    ctx.require(Capability::RecordMarks)?;
    let recorded = ExamService::new(ctx.db())
        .record_marks(id, body, ctx.actor_id())
        .await?;
    Ok(Json(MarksRecorded { recorded }))
}

async fn list_marks(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Query(query): Query<ClassQuery>,
) -> Result<Json<ListResponse<Mark>>, ApiError> {
    ctx.require(Capability::ViewResults)?;
    Ok(Json(ExamService::new(ctx.db()).marks(id, query.class_id).await?.into()))
}

/// GET /schools/{code}/exams/{id}/results?class_id=
async fn results(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Query(query): Query<ClassQuery>,
) -> Result<Json<ResultSheet>, ApiError> {
    ctx.require(Capability::ViewResults)?;
    let exams = ExamService::new(ctx.db());
    let exam = exams.get(id).await?;
    let results = exams.results(id, query.class_id).await?;
    Ok(Json(ResultSheet {
        exam,
        class_id: query.class_id,
        results,
    }))
}
