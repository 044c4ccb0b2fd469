//! Super-admin repository (platform registry)

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::SuperAdmin;

const COLUMNS: &str = "id, name, email, password_hash, is_active, created_at";

#[async_trait]
pub trait SuperAdminRepository: Send + Sync {
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> Result<SuperAdmin>;

    async fn get_by_email(&self, email: &str) -> Result<Option<SuperAdmin>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<SuperAdmin>>;

    async fn list(&self) -> Result<Vec<SuperAdmin>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxSuperAdminRepository {
    pool: DynDatabasePool,
}

impl SqlxSuperAdminRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SuperAdminRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SuperAdminRepository for SqlxSuperAdminRepository {
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> Result<SuperAdmin> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO super_admins (name, email, password_hash) VALUES (?, ?, ?)")
                .bind(name)
                .bind(email)
                .bind(password_hash)
                .execute(p)
                .await
                .context("Failed to insert super-admin")?
                .inserted_id()
        });

        self.get_by_id(id)
            .await?
            .context("Super-admin missing after insert")
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<SuperAdmin>> {
        let sql = format!("SELECT {} FROM super_admins WHERE email = ?", COLUMNS);
        let admin = on_pool!(self.pool, p => {
            sqlx::query_as::<_, SuperAdmin>(&sql)
                .bind(email)
                .fetch_optional(p)
                .await?
        });
        Ok(admin)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SuperAdmin>> {
        let sql = format!("SELECT {} FROM super_admins WHERE id = ?", COLUMNS);
        let admin = on_pool!(self.pool, p => {
            sqlx::query_as::<_, SuperAdmin>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await?
        });
        Ok(admin)
    }

    async fn list(&self) -> Result<Vec<SuperAdmin>> {
        let sql = format!("SELECT {} FROM super_admins ORDER BY name", COLUMNS);
        let admins = on_pool!(self.pool, p => {
            sqlx::query_as::<_, SuperAdmin>(&sql).fetch_all(p).await?
        });
        Ok(admins)
    }

    async fn count(&self) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM super_admins")
                .fetch_one(p)
                .await?
        });
        Ok(count)
    }
}
