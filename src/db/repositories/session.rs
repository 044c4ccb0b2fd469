//! Session repository
//!
//! Sessions of every school live in the platform registry, keyed by token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{on_pool, DynDatabasePool};
use crate::models::Session;

const COLUMNS: &str = "id, user_id, school_code, role, name, email, expires_at, created_at";

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<()>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Revoke every session of one school user (or super-admin when `school_code` is `None`)
    async fn delete_by_user(&self, school_code: Option<&str>, user_id: i64) -> Result<u64>;

    /// Revoke every session belonging to a school
    async fn delete_by_school(&self, school_code: &str) -> Result<u64>;

    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO sessions (id, user_id, school_code, role, name, email, expires_at, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(&session.school_code)
            .bind(session.role.as_str())
            .bind(&session.name)
            .bind(&session.email)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(p)
            .await
            .context("Failed to create session")?;
        });
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sql = format!("SELECT {} FROM sessions WHERE id = ?", COLUMNS);
        let session = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Session>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to load session")?
        });
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(p)
                .await?;
        });
        Ok(())
    }

    async fn delete_by_user(&self, school_code: Option<&str>, user_id: i64) -> Result<u64> {
        let affected = on_pool!(self.pool, p => {
            match school_code {
                Some(code) => sqlx::query("DELETE FROM sessions WHERE school_code = ? AND user_id = ?")
                    .bind(code)
                    .bind(user_id)
                    .execute(p)
                    .await?
                    .rows_affected(),
                None => sqlx::query("DELETE FROM sessions WHERE school_code IS NULL AND user_id = ?")
                    .bind(user_id)
                    .execute(p)
                    .await?
                    .rows_affected(),
            }
        });
        Ok(affected)
    }

    async fn delete_by_school(&self, school_code: &str) -> Result<u64> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM sessions WHERE school_code = ?")
                .bind(school_code)
                .execute(p)
                .await?
                .rows_affected()
        });
        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(Utc::now())
                .execute(p)
                .await?
                .rows_affected()
        });
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::Role;
    use chrono::Duration;

    async fn repo() -> SqlxSessionRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::PLATFORM_MIGRATIONS)
            .await
            .unwrap();
        SqlxSessionRepository::new(pool)
    }

    fn session(id: &str, school: Option<&str>, expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id: 7,
            school_code: school.map(str::to_string),
            role: Role::Teacher,
            name: "Grace".to_string(),
            email: "grace@school.test".to_string(),
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let repo = repo().await;
        repo.create(&session("tok-1", Some("greenfield"), Duration::days(1)))
            .await
            .unwrap();

        let loaded = repo.get_by_id("tok-1").await.unwrap().unwrap();
        assert_eq!(loaded.role, Role::Teacher);
        assert_eq!(loaded.school_code.as_deref(), Some("greenfield"));
        assert!(!loaded.is_expired());
    }

    #[tokio::test]
    async fn test_delete_expired_and_by_school() {
        let repo = repo().await;
        repo.create(&session("old", Some("a"), Duration::days(-1))).await.unwrap();
        repo.create(&session("fresh-a", Some("a"), Duration::days(1))).await.unwrap();
        repo.create(&session("fresh-b", Some("b"), Duration::days(1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert_eq!(repo.delete_by_school("a").await.unwrap(), 1);
        assert!(repo.get_by_id("fresh-b").await.unwrap().is_some());
        assert_eq!(repo.delete_by_user(Some("b"), 7).await.unwrap(), 1);
    }
}
