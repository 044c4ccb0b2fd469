//! Library API endpoints: catalogue and loans

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse, OnDate};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::{BookUpdate, NewBook};
use crate::models::{Book, BookLoan};
use crate::services::{Capability, IssueLoanInput, LibraryService, LoanQuery};

#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    pub q: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/{id}", get(get_book).put(update_book).delete(delete_book))
        .route("/loans", get(list_loans).post(issue_loan))
        .route("/loans/{id}", get(get_loan))
        .route("/loans/{id}/return", post(return_loan))
}

fn service(ctx: &SchoolContext) -> Result<LibraryService, ApiError> {
    ctx.require(Capability::ManageLibrary)?;
    Ok(LibraryService::new(ctx.db()))
}

async fn list_books(
    ctx: SchoolContext,
    Query(query): Query<BookQuery>,
) -> Result<Json<ListResponse<Book>>, ApiError> {
    Ok(Json(service(&ctx)?.list_books(query.q).await?.into()))
}

async fn create_book(
    ctx: SchoolContext,
    Json(body): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    Ok(created(service(&ctx)?.create_book(body).await?))
}

async fn get_book(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<Book>, ApiError> {
    Ok(Json(service(&ctx)?.get_book(id).await?))
}

/// PUT /schools/{code}/books/{id}
///
/// `total_copies` cannot drop below the copies currently on loan.
async fn update_book(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<BookUpdate>,
) -> Result<Json<Book>, ApiError> {
    Ok(Json(service(&ctx)?.update_book(id, body).await?))
}

async fn delete_book(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    service(&ctx)?.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /schools/{code}/loans?active=&overdue=&student_id=
async fn list_loans(
    ctx: SchoolContext,
    Query(query): Query<LoanQuery>,
) -> Result<Json<ListResponse<BookLoan>>, ApiError> {
    Ok(Json(service(&ctx)?.list_loans(query).await?.into()))
}

async fn issue_loan(
    ctx: SchoolContext,
    Json(body): Json<IssueLoanInput>,
) -> Result<(StatusCode, Json<BookLoan>), ApiError> {
    Ok(created(service(&ctx)?.issue_loan(body).await?))
}

async fn get_loan(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<BookLoan>, ApiError> {
    Ok(Json(service(&ctx)?.get_loan(id).await?))
}

async fn return_loan(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    body: Option<Json<OnDate>>,
) -> Result<Json<BookLoan>, ApiError> {
    let date = body.and_then(|Json(on)| on.date);
    Ok(Json(service(&ctx)?.return_loan(id, date).await?))
}
