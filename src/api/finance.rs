//! Finance API endpoints: invoices, payments, expenses and reports
//!
//! Amounts in requests and responses are integer minor units.

use axum::{
    extract::{Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse, PeriodQuery};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::{InvoiceFilter, NewExpense, NewInvoice, NewPayment};
use crate::models::{
    Expense, ExpenseSummary, FeeCollectionSummary, FeePayment, IncomeStatement, Invoice,
    InvoiceStatus,
};
use crate::services::{Capability, FinanceService};

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub student_id: Option<i64>,
    pub term_id: Option<i64>,
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TermQuery {
    pub term_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/{id}", get(get_invoice))
        .route("/invoices/{id}/payments", get(list_payments).post(record_payment))
        .route("/payments/export.csv", get(export_payments))
        .route("/payments/{id}", delete(void_payment))
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/{id}", delete(delete_expense))
        .route("/reports/fee-collection", get(fee_collection))
        .route("/reports/income-statement", get(income_statement))
        .route("/reports/expenses", get(expense_summary))
}

fn manage(ctx: &SchoolContext) -> Result<FinanceService, ApiError> {
    ctx.require(Capability::ManageFinance)?;
    Ok(FinanceService::new(ctx.db()))
}

fn reports(ctx: &SchoolContext) -> Result<FinanceService, ApiError> {
    ctx.require(Capability::ViewFinanceReports)?;
    Ok(FinanceService::new(ctx.db()))
}

// Invoices

async fn list_invoices(
    ctx: SchoolContext,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<ListResponse<Invoice>>, ApiError> {
    let finance = manage(&ctx)?;
    let filter = InvoiceFilter {
        student_id: query.student_id,
        term_id: query.term_id,
        status: query.status,
    };
    Ok(Json(finance.list_invoices(filter).await?.into()))
}

async fn create_invoice(
    ctx: SchoolContext,
    Json(body): Json<NewInvoice>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    let finance = manage(&ctx)?;
    Ok(created(finance.create_invoice(body).await?))
}

async fn get_invoice(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(manage(&ctx)?.get_invoice(id).await?))
}

// Payments

async fn list_payments(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<ListResponse<FeePayment>>, ApiError> {
    Ok(Json(manage(&ctx)?.payments_for_invoice(id).await?.into()))
}

/// POST /schools/{code}/invoices/{id}/payments
///
/// Refused with 400 when the amount exceeds the outstanding balance.
async fn record_payment(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<NewPayment>,
) -> Result<(StatusCode, Json<FeePayment>), ApiError> {
    let finance = manage(&ctx)?;
    let payment = finance.record_payment(id, body, ctx.actor_id()).await?;
    tracing::info!(
        "School {}: payment {} of {} on invoice {}",
        ctx.tenant.code,
        payment.receipt_number(),
        payment.amount,
        id
    );
    Ok(created(payment))
}

async fn void_payment(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    manage(&ctx)?.void_payment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /schools/{code}/payments/export.csv?from=&to=
async fn export_payments(
    ctx: SchoolContext,
    Query(period): Query<PeriodQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let csv = reports(&ctx)?.export_payments_csv(period.from, period.to).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"payments.csv\""),
        ],
        csv,
    ))
}

// Expenses

async fn list_expenses(
    ctx: SchoolContext,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<ListResponse<Expense>>, ApiError> {
    Ok(Json(manage(&ctx)?.list_expenses(period.from, period.to).await?.into()))
}

async fn create_expense(
    ctx: SchoolContext,
    Json(body): Json<NewExpense>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let finance = manage(&ctx)?;
    Ok(created(finance.create_expense(body, ctx.actor_id()).await?))
}

async fn delete_expense(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    manage(&ctx)?.delete_expense(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Reports

async fn fee_collection(
    ctx: SchoolContext,
    Query(query): Query<TermQuery>,
) -> Result<Json<FeeCollectionSummary>, ApiError> {
    Ok(Json(reports(&ctx)?.fee_collection(query.term_id).await?))
}

async fn income_statement(
    ctx: SchoolContext,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<IncomeStatement>, ApiError> {
    Ok(Json(reports(&ctx)?.income_statement(period.from, period.to).await?))
}

async fn expense_summary(
    ctx: SchoolContext,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<ExpenseSummary>, ApiError> {
    Ok(Json(reports(&ctx)?.expense_summary(period.from, period.to).await?))
}
