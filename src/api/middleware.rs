//! API middleware
//!
//! Contains middleware and extractors for:
//! - Authentication (session token from `Authorization: Bearer` or the
//!   `session` cookie)
//! - Super-admin gating of the platform routes
//! - Tenant resolution for `/schools/{code}` routes
//!
//! plus the JSON error envelope every handler returns.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::cache::MemoryCache;
use crate::db::DynDatabasePool;
use crate::models::Claims;
use crate::services::{authorize, AuthService, Capability, PlatformService, ServiceError};
use crate::site::SiteRenderer;
use crate::tenancy::{TenancyError, Tenant, TenantRouter};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    /// Platform registry pool (schools, super-admins, sessions)
    pub platform: DynDatabasePool,
    pub router: Arc<TenantRouter>,
    pub auth: Arc<AuthService>,
    pub platform_service: Arc<PlatformService>,
    pub cache: Arc<MemoryCache>,
    pub site: Arc<SiteRenderer>,
    /// Lifetime of the session cookie
    pub session_days: i64,
}

/// Claims of the caller, inserted by [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Claims);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Caller and school of a `/schools/{code}` request, set up by
/// [`resolve_tenant`]
#[derive(Debug, Clone)]
pub struct SchoolContext {
    pub tenant: Tenant,
    pub claims: Claims,
}

impl SchoolContext {
    /// Fail with 403 unless the caller holds `capability` in this school
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        authorize(&self.claims, &self.tenant.code, capability).map_err(ApiError::from)
    }

    pub fn db(&self) -> DynDatabasePool {
        self.tenant.db.clone()
    }

    /// Acting user id for audit columns; super-admins are not school users
    pub fn actor_id(&self) -> Option<i64> {
        (!self.claims.is_super_admin()).then_some(self.claims.user_id)
    }
}

impl<S> FromRequestParts<S> for SchoolContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|user| user.0.clone())
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let tenant = parts
            .extensions
            .get::<Tenant>()
            .cloned()
            .ok_or_else(|| ApiError::internal_error("School context missing"))?;
        Ok(Self { tenant, claims })
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMIT", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("UNAVAILABLE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::validation_error(msg),
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::Conflict(msg) => Self::conflict(msg),
            ServiceError::Forbidden(msg) => Self::forbidden(msg),
            ServiceError::Unauthorized(msg) => Self::unauthorized(msg),
            ServiceError::RateLimited(msg) => Self::rate_limited(msg),
            ServiceError::Unavailable(msg) => Self::unavailable(msg),
            ServiceError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::UnknownSchool(_) | TenancyError::Inactive(_) => {
                Self::not_found("School not found")
            }
            TenancyError::Connect { code, message } => {
                tracing::warn!("School {} database unavailable: {}", code, message);
                Self::unavailable("The school database is unavailable")
            }
            TenancyError::Registry(e) => {
                tracing::error!("School registry error: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer when the server was started with connect info
pub fn client_ip(headers: &HeaderMap, connect: Option<&ConnectInfo<SocketAddr>>) -> Option<IpAddr> {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| connect.map(|info| info.0.ip()))
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let claims = state
        .auth
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}

/// Super-admin middleware; must run after [`require_auth`]
pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_super_admin() {
        return Err(ApiError::forbidden("Super-admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Tenant middleware for `/schools/{code}` routes; must run after
/// [`require_auth`].
///
/// Callers from another school are refused before the registry is
/// consulted, so they cannot probe which codes exist.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let code = params
        .get("code")
        .ok_or_else(|| ApiError::not_found("School not found"))?;

    let claims = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0.clone())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !claims.is_super_admin() {
        let own = claims.school_code.as_deref().unwrap_or_default();
        if !own.eq_ignore_ascii_case(code.trim()) {
            return Err(ApiError::forbidden("You do not have access to this school"));
        }
    }

    let tenant = state.router.resolve(code).await?;
    request.extensions_mut().insert(tenant);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::new("SOMETHING_ELSE", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_error_conversion() {
        let err: ApiError = ServiceError::Validation("bad".into()).into();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(err.error.message, "bad");

        let err: ApiError = ServiceError::Internal(anyhow::anyhow!("db password leaked")).into();
        assert_eq!(err.error.message, "Internal server error");

        let err: ApiError = TenancyError::Inactive("closed".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_with_details() {
        let details = serde_json::json!({"field": "email"});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
    }

    #[test]
    fn test_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc123"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("xyz"));

        let mut cleared = HeaderMap::new();
        cleared.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(extract_session_token(&cleared), None);
    }

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        let peer = ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 5000)));
        assert_eq!(client_ip(&headers, Some(&peer)), Some(IpAddr::from([10, 0, 0, 9])));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(&peer)), Some(IpAddr::from([203, 0, 113, 7])));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
