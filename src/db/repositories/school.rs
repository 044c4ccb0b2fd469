//! School registry repository
//!
//! - `SchoolRepository` trait defining registry access
//! - `SqlxSchoolRepository` implementing it for SQLite and MySQL

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::School;

const COLUMNS: &str = "id, code, name, database_url, is_active, created_at, updated_at";

/// Fields accepted when registering or editing a school
#[derive(Debug, Clone)]
pub struct SchoolRecord {
    pub code: String,
    pub name: String,
    pub database_url: String,
    pub is_active: bool,
}

#[async_trait]
pub trait SchoolRepository: Send + Sync {
    async fn create(&self, record: &SchoolRecord) -> Result<School>;

    async fn get_by_code(&self, code: &str) -> Result<Option<School>>;

    async fn list(&self) -> Result<Vec<School>>;

    /// Overwrite name, URL and status of the school identified by `record.code`
    async fn update(&self, record: &SchoolRecord) -> Result<Option<School>>;

    /// Hard delete; only used to roll back a school that failed provisioning
    async fn delete(&self, code: &str) -> Result<()>;
}

pub struct SqlxSchoolRepository {
    pool: DynDatabasePool,
}

impl SqlxSchoolRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SchoolRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SchoolRepository for SqlxSchoolRepository {
    async fn create(&self, record: &SchoolRecord) -> Result<School> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO schools (code, name, database_url, is_active) VALUES (?, ?, ?, ?)",
            )
            .bind(&record.code)
            .bind(&record.name)
            .bind(&record.database_url)
            .bind(record.is_active)
            .execute(p)
            .await
            .context("Failed to insert school")?
            .inserted_id()
        });

        tracing::debug!("Registered school {} with id {}", record.code, id);

        self.get_by_code(&record.code)
            .await?
            .context("School missing after insert")
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<School>> {
        let sql = format!("SELECT {} FROM schools WHERE code = ?", COLUMNS);
        let school = on_pool!(self.pool, p => {
            sqlx::query_as::<_, School>(&sql)
                .bind(code)
                .fetch_optional(p)
                .await
                .context("Failed to load school")?
        });
        Ok(school)
    }

    async fn list(&self) -> Result<Vec<School>> {
        let sql = format!("SELECT {} FROM schools ORDER BY name", COLUMNS);
        let schools = on_pool!(self.pool, p => {
            sqlx::query_as::<_, School>(&sql)
                .fetch_all(p)
                .await
                .context("Failed to list schools")?
        });
        Ok(schools)
    }

    async fn update(&self, record: &SchoolRecord) -> Result<Option<School>> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query(
                "UPDATE schools SET name = ?, database_url = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE code = ?",
            )
            .bind(&record.name)
            .bind(&record.database_url)
            .bind(record.is_active)
            .bind(&record.code)
            .execute(p)
            .await
            .context("Failed to update school")?
            .rows_affected()
        });

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_code(&record.code).await
    }

    async fn delete(&self, code: &str) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM schools WHERE code = ?")
                .bind(code)
                .execute(p)
                .await
                .context("Failed to delete school")?;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    async fn repo() -> SqlxSchoolRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::PLATFORM_MIGRATIONS)
            .await
            .unwrap();
        SqlxSchoolRepository::new(pool)
    }

    fn record(code: &str) -> SchoolRecord {
        SchoolRecord {
            code: code.to_string(),
            name: format!("{} school", code),
            database_url: "sqlite::memory:".to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let created = repo.create(&record("greenfield")).await.unwrap();
        assert_eq!(created.code, "greenfield");
        assert!(created.is_active);

        let loaded = repo.get_by_code("greenfield").await.unwrap().unwrap();
        assert_eq!(loaded.id, created.id);
        assert!(repo.get_by_code("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_is_unique_violation() {
        let repo = repo().await;
        repo.create(&record("hillside")).await.unwrap();
        let err = repo.create(&record("hillside")).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repo().await;
        repo.create(&record("riverside")).await.unwrap();

        let mut changed = record("riverside");
        changed.is_active = false;
        changed.name = "Riverside High".to_string();
        let updated = repo.update(&changed).await.unwrap().unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.name, "Riverside High");

        assert!(repo.update(&record("nowhere")).await.unwrap().is_none());

        repo.delete("riverside").await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }
}
