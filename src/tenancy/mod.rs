//! Tenant connection resolver
//!
//! Maps a school code to a live pool on that school's own database. The
//! connection URL comes from the platform registry; pools are opened on first
//! use, migrated, and kept in a bounded moka cache. Concurrent first requests
//! for one school share a single connection attempt, and a failed attempt is
//! not cached.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::TenancyConfig;
use crate::db::repositories::{SchoolRepository, SqlxSchoolRepository};
use crate::db::{connect_url, migrations, redact_url, DynDatabasePool};
use crate::models::School;

/// A resolved school with its database
#[derive(Clone)]
pub struct Tenant {
    pub code: String,
    pub name: String,
    pub db: DynDatabasePool,
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("driver", &self.db.driver())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("Unknown school: {0}")]
    UnknownSchool(String),

    #[error("School is inactive: {0}")]
    Inactive(String),

    #[error("Cannot connect to the database of school {code}: {message}")]
    Connect { code: String, message: String },

    #[error("School registry error: {0}")]
    Registry(#[from] anyhow::Error),
}

/// Canonical form of a school code as typed in a URL or login form
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

pub struct TenantRouter {
    schools: Arc<dyn SchoolRepository>,
    pools: Cache<String, DynDatabasePool>,
    max_connections: u32,
}

impl TenantRouter {
    pub fn new(platform: DynDatabasePool, config: &TenancyConfig) -> Self {
        Self::with_repository(SqlxSchoolRepository::boxed(platform), config)
    }

    pub fn with_repository(schools: Arc<dyn SchoolRepository>, config: &TenancyConfig) -> Self {
        let pools = Cache::builder()
            .max_capacity(config.max_tenants.max(1))
            .time_to_idle(Duration::from_secs(config.idle_seconds.max(1)))
            .eviction_listener(|code: Arc<String>, _pool, cause| {
                tracing::info!("Released database pool of school {} ({:?})", code, cause);
            })
            .build();

        Self {
            schools,
            pools,
            max_connections: config.max_connections.max(1),
        }
    }

    /// Resolve an active school to its database, connecting on first use
    pub async fn resolve(&self, code: &str) -> Result<Tenant, TenancyError> {
        let code = normalize_code(code);
        let school = self
            .schools
            .get_by_code(&code)
            .await?
            .ok_or_else(|| TenancyError::UnknownSchool(code.clone()))?;

        if !school.is_active {
            return Err(TenancyError::Inactive(code));
        }

        let db = self.pool_for(&school).await?;
        Ok(Tenant {
            code: school.code,
            name: school.name,
            db,
        })
    }

    async fn pool_for(&self, school: &School) -> Result<DynDatabasePool, TenancyError> {
        let url = school.database_url.clone();
        let code = school.code.clone();
        let max_connections = self.max_connections;

        self.pools
            .try_get_with(school.code.clone(), async move {
                tracing::info!("Connecting school {} to {}", code, redact_url(&url));
                let pool = connect_url(&url, max_connections).await?;
                migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS).await?;
                Ok::<_, anyhow::Error>(pool)
            })
            .await
            .map_err(|e: Arc<anyhow::Error>| TenancyError::Connect {
                code: school.code.clone(),
                message: format!("{:#}", e),
            })
    }

    /// Drop the cached pool of a school, e.g. after its URL or status changed
    pub async fn invalidate(&self, code: &str) {
        self.pools.invalidate(&normalize_code(code)).await;
    }

    /// Number of schools with an open pool
    pub async fn connected_count(&self) -> u64 {
        self.pools.run_pending_tasks().await;
        self.pools.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SchoolRecord;
    use crate::db::create_test_pool;

    async fn router_with(schools: &[(&str, &str, bool)]) -> TenantRouter {
        let platform = create_test_pool().await.unwrap();
        migrations::run_migrations(&platform, migrations::PLATFORM_MIGRATIONS)
            .await
            .unwrap();
        let repo = SqlxSchoolRepository::new(platform.clone());
        for (code, url, active) in schools {
            repo.create(&SchoolRecord {
                code: code.to_string(),
                name: format!("{} academy", code),
                database_url: url.to_string(),
                is_active: *active,
            })
            .await
            .unwrap();
        }
        TenantRouter::new(platform, &TenancyConfig::default())
    }

    #[tokio::test]
    async fn test_resolve_connects_and_migrates() {
        let router = router_with(&[("greenfield", "sqlite::memory:", true)]).await;

        let tenant = router.resolve("  GreenField ").await.unwrap();
        assert_eq!(tenant.code, "greenfield");
        assert!(migrations::is_up_to_date(&tenant.db, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap());

        let again = router.resolve("greenfield").await.unwrap();
        assert!(Arc::ptr_eq(&tenant.db, &again.db));
        assert_eq!(router.connected_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_shares_one_pool() {
        let router = Arc::new(router_with(&[("hillside", "sqlite::memory:", true)]).await);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { router.resolve("hillside").await.unwrap().db })
            })
            .collect();

        let mut pools = Vec::new();
        for handle in handles {
            pools.push(handle.await.unwrap());
        }
        assert!(pools.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(router.connected_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_schools() {
        let router = router_with(&[("closed", "sqlite::memory:", false)]).await;

        assert!(matches!(
            router.resolve("nowhere").await,
            Err(TenancyError::UnknownSchool(code)) if code == "nowhere"
        ));
        assert!(matches!(router.resolve("closed").await, Err(TenancyError::Inactive(_))));
        assert_eq!(router.connected_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_cached() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let bad_url = format!("sqlite:{}/nested/school.db", blocker.path().display());
        let router = router_with(&[("broken", &bad_url, true)]).await;

        assert!(matches!(router.resolve("broken").await, Err(TenancyError::Connect { .. })));
        assert_eq!(router.connected_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalidate_drops_pool() {
        let router = router_with(&[("riverside", "sqlite::memory:", true)]).await;
        let first = router.resolve("riverside").await.unwrap();
        router.invalidate("Riverside").await;
        assert_eq!(router.connected_count().await, 0);

        let second = router.resolve("riverside").await.unwrap();
        assert!(!Arc::ptr_eq(&first.db, &second.db));
    }
}
