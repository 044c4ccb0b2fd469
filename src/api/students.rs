//! Student register API endpoints

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::{ClassHeadcount, NewStudent, StudentFilter, StudentUpdate};
use crate::models::{Page, Student, StudentStatus};
use crate::services::{Capability, StudentService};

/// `GET /students` query: filters plus paging
#[derive(Debug, Default, Deserialize)]
pub struct StudentQuery {
    pub class_id: Option<i64>,
    pub status: Option<StudentStatus>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/students", get(list_students).post(create_student))
        .route("/students/count-per-class", get(count_per_class))
        .route("/students/{id}", get(get_student).put(update_student))
}

async fn list_students(
    ctx: SchoolContext,
    Query(query): Query<StudentQuery>,
) -> Result<Json<Page<Student>>, ApiError> {
    ctx.require(Capability::ViewAcademics)?;
    let filter = StudentFilter {
        class_id: query.class_id,
        status: query.status,
        q: query.q,
    };
    let page = StudentService::new(ctx.db())
        .list(filter, query.page, query.per_page)
        .await?;
    Ok(Json(page))
}

async fn create_student(
    ctx: SchoolContext,
    Json(body): Json<NewStudent>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    ctx.require(Capability::ManageStudents)?;
    Ok(created(StudentService::new(ctx.db()).create(body).await?))
}

async fn get_student(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<Student>, ApiError> {
    ctx.require(Capability::ViewAcademics)?;
    Ok(Json(StudentService::new(ctx.db()).get(id).await?))
}

async fn update_student(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<StudentUpdate>,
) -> Result<Json<Student>, ApiError> {
    ctx.require(Capability::ManageStudents)?;
    Ok(Json(StudentService::new(ctx.db()).update(id, body).await?))
}

/// GET /schools/{code}/students/count-per-class
async fn count_per_class(ctx: SchoolContext) -> Result<Json<ListResponse<ClassHeadcount>>, ApiError> {
    ctx.require(Capability::ViewAcademics)?;
    Ok(Json(StudentService::new(ctx.db()).count_per_class().await?.into()))
}
