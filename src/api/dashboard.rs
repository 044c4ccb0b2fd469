//! Dashboard API endpoint

use axum::{routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::services::{Capability, DashboardService, DashboardSummary};

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(summary))
}

async fn summary(ctx: SchoolContext) -> Result<Json<DashboardSummary>, ApiError> {
    ctx.require(Capability::ViewDashboard)?;
    Ok(Json(DashboardService::new(ctx.db()).summary().await?))
}
