//! Unauthenticated JSON endpoints: health check and public site data

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::{PublicSite, WebsiteService};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/public/{code}/site", get(public_site))
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/v1/public/{code}/site
///
/// Settings and latest news of an active school; 404 for unknown or
/// deactivated codes.
async fn public_site(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PublicSite>, ApiError> {
    let tenant = state.router.resolve(&code).await?;
    let site = WebsiteService::new(&tenant, state.cache.clone())
        .public_site()
        .await?;
    Ok(Json(site))
}
