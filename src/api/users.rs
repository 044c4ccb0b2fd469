//! School user API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{created, ListResponse};
use crate::api::middleware::{ApiError, AppState, SchoolContext};
use crate::db::repositories::UserUpdate;
use crate::models::{Role, User};
use crate::services::{Capability, CreateUserInput, UserService};

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordInput {
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user))
        .route("/users/{id}/password", put(set_password))
}

async fn list_users(
    ctx: SchoolContext,
    Query(query): Query<UserListQuery>,
) -> Result<Json<ListResponse<User>>, ApiError> {
    ctx.require(Capability::ManageUsers)?;
    Ok(Json(UserService::new(ctx.db()).list(query.role).await?.into()))
}

async fn create_user(
    ctx: SchoolContext,
    Json(body): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    ctx.require(Capability::ManageUsers)?;
    let user = UserService::new(ctx.db()).create(body).await?;
    tracing::info!("School {}: created {} account {}", ctx.tenant.code, user.role, user.id);
    Ok(created(user))
}

async fn get_user(
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
) -> Result<Json<User>, ApiError> {
    ctx.require(Capability::ManageUsers)?;
    Ok(Json(UserService::new(ctx.db()).get(id).await?))
}

/// PUT /schools/{code}/users/{id}
///
/// Deactivating or changing the role signs the user out everywhere.
async fn update_user(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    ctx.require(Capability::ManageUsers)?;
    let revoke = body.is_active == Some(false) || body.role.is_some();
    let user = UserService::new(ctx.db()).update(id, body).await?;

    if revoke {
        let revoked = state
            .auth
            .revoke_user_sessions(Some(&ctx.tenant.code), user.id)
            .await?;
        tracing::debug!("Revoked {} sessions of user {}", revoked, user.id);
    }
    Ok(Json(user))
}

async fn set_password(
    State(state): State<AppState>,
    ctx: SchoolContext,
    Path((_code, id)): Path<(String, i64)>,
    Json(body): Json<PasswordInput>,
) -> Result<StatusCode, ApiError> {
    ctx.require(Capability::ManageUsers)?;
    UserService::new(ctx.db()).set_password(id, &body.password).await?;
    state.auth.revoke_user_sessions(Some(&ctx.tenant.code), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
