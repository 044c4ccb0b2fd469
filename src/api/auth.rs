//! Authentication API endpoints
//!
//! - `POST /api/v1/auth/login`: email + password (+ school code for school
//!   users); sets the `session` cookie and returns the token
//! - `POST /api/v1/auth/logout`
//! - `GET /api/v1/auth/me`

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;

use crate::api::middleware::{client_ip, extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::Claims;
use crate::services::LoginInput;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Claims,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

fn session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token, max_age_secs
    ))
    .map_err(|_| ApiError::internal_error("Invalid session token"))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    connect: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, connect.as_ref().map(|Extension(info)| info));
    let outcome = state.auth.login(body, ip).await?;

    tracing::info!(
        user_id = outcome.claims.user_id,
        role = %outcome.claims.role,
        school = outcome.claims.school_code.as_deref().unwrap_or("-"),
        "Login succeeded"
    );

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        session_cookie(&outcome.session.id, state.session_days * 24 * 60 * 60)?,
    );

    Ok((
        response_headers,
        Json(LoginResponse {
            token: outcome.session.id,
            expires_at: outcome.session.expires_at,
            user: outcome.claims,
        }),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.auth.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, session_cookie("", 0)?);
    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me
async fn me(user: AuthenticatedUser) -> Json<Claims> {
    Json(user.0)
}
