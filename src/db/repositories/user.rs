//! User repository
//!
//! Accounts stored inside one school database.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{Role, User};

const COLUMNS: &str = "id, name, email, password_hash, role, is_active, created_at, updated_at";

/// Account to insert; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Editable profile fields; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &NewUser) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// List users, optionally restricted to one role
    async fn list(&self, role: Option<Role>) -> Result<Vec<User>>;

    async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<bool>;

    /// Count active accounts that are not students
    async fn count_active_staff(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO users (name, email, password_hash, role) VALUES (?, ?, ?, ?)")
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.role.as_str())
                .execute(p)
                .await
                .context("Failed to insert user")?
                .inserted_id()
        });

        self.get_by_id(id).await?.context("User missing after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", COLUMNS);
        let user = on_pool!(self.pool, p => {
            sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", COLUMNS);
        let user = on_pool!(self.pool, p => {
            sqlx::query_as::<_, User>(&sql).bind(email).fetch_optional(p).await?
        });
        Ok(user)
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<User>> {
        let users = match role {
            Some(role) => {
                let sql = format!("SELECT {} FROM users WHERE role = ? ORDER BY name", COLUMNS);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, User>(&sql)
                        .bind(role.as_str())
                        .fetch_all(p)
                        .await?
                })
            }
            None => {
                let sql = format!("SELECT {} FROM users ORDER BY name", COLUMNS);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, User>(&sql).fetch_all(p).await?
                })
            }
        };
        Ok(users)
    }

    async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>> {
        let Some(current) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let name = update.name.as_deref().unwrap_or(&current.name);
        let role = update.role.unwrap_or(current.role);
        let is_active = update.is_active.unwrap_or(current.is_active);

        on_pool!(self.pool, p => {
            sqlx::query(
                "UPDATE users SET name = ?, role = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(name)
            .bind(role.as_str())
            .bind(is_active)
            .bind(id)
            .execute(p)
            .await
            .context("Failed to update user")?;
        });

        self.get_by_id(id).await
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
                .bind(password_hash)
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn count_active_staff(&self) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE is_active = ? AND role <> ?",
            )
            .bind(true)
            .bind(Role::Student.as_str())
            .fetch_one(p)
            .await?
        });
        Ok(count)
    }
}
