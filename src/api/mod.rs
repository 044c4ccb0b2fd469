//! API layer - HTTP handlers and routing
//!
//! - `/api/v1/health`, `/api/v1/public/{code}/site`: no authentication
//! - `/api/v1/auth`: login, logout, current user
//! - `/api/v1/platform`: schools registry, super-admin only
//! - `/api/v1/schools/{code}/...`: per-school modules; the caller must
//!   belong to the school (or be a super-admin) and hold the capability
//!   each handler asks for
//! - `/s/{code}/...`: server-rendered public websites

pub mod academics;
pub mod auth;
pub mod common;
pub mod dashboard;
pub mod dormitory;
pub mod exams;
pub mod finance;
pub mod library;
pub mod middleware;
pub mod notices;
pub mod pharmacy;
pub mod platform;
pub mod public;
pub mod site;
pub mod students;
pub mod timetable;
pub mod users;
pub mod website;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, SchoolContext};

/// Routes of one school, mounted under `/schools/{code}`
fn school_router() -> Router<AppState> {
    Router::new()
        .merge(users::router())
        .merge(academics::router())
        .merge(students::router())
        .merge(exams::router())
        .merge(finance::router())
        .merge(library::router())
        .merge(pharmacy::router())
        .merge(dormitory::router())
        .merge(timetable::router())
        .merge(notices::router())
        .merge(website::router())
        .merge(dashboard::router())
}

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let platform_routes = Router::new()
        .nest("/platform", platform::router())
        .route_layer(axum_middleware::from_fn(middleware::require_super_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let school_routes = Router::new()
        .nest("/schools/{code}", school_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_tenant,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public::router())
        .nest("/auth", auth::public_router())
        .merge(protected_routes)
        .merge(platform_routes)
        .merge(school_routes)
}

/// CORS for the configured origins (comma separated), with cookies allowed
fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors_origin
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .merge(site::router())
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
