//! Database layer
//!
//! Two kinds of database sit behind the same `DatabasePool` abstraction:
//! - the platform registry (schools, super-admins, sessions), opened from
//!   configuration at startup;
//! - one database per school, opened lazily from the URL stored in the
//!   registry (see [`crate::tenancy`]).
//!
//! Both SQLite and MySQL are supported. Queries are written once in portable
//! SQL and dispatched to the concrete pool with [`on_pool!`].
//!
//! # Usage
//!
//! ```ignore
//! use scholaris::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool, migrations::PLATFORM_MIGRATIONS).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    connect_url, create_pool, create_test_pool, driver_for_url, redact_url, DatabasePool,
    DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// Run `$body` against the concrete pool behind a [`DynDatabasePool`].
///
/// The body is expanded once per backend with `$p` bound to `&SqlitePool` or
/// `&MySqlPool`, so it must type-check against both. The enclosing function
/// must return a `Result` whose error converts from `anyhow::Error`.
macro_rules! on_pool {
    ($db:expr, $p:ident => $body:expr) => {{
        let db = &$db;
        match db.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $p = db
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool unavailable"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $p = db
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool unavailable"))?;
                $body
            }
        }
    }};
}

pub(crate) use on_pool;

/// Backend-neutral access to the id generated by an `INSERT`.
pub trait InsertedId {
    fn inserted_id(&self) -> i64;
}

impl InsertedId for sqlx::sqlite::SqliteQueryResult {
    fn inserted_id(&self) -> i64 {
        self.last_insert_rowid()
    }
}

impl InsertedId for sqlx::mysql::MySqlQueryResult {
    fn inserted_id(&self) -> i64 {
        self.last_insert_id() as i64
    }
}

/// Whether an error chain contains a unique-constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    })
}

/// Whether an error chain contains a foreign-key violation.
pub fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_foreign_key_violation(),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    async fn count_rows(pool: &DynDatabasePool) -> anyhow::Result<i64> {
        let count = on_pool!(pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM probe")
                .fetch_one(p)
                .await?
        });
        Ok(count)
    }

    async fn insert_probe(pool: &DynDatabasePool, name: &str) -> anyhow::Result<i64> {
        let id = on_pool!(pool, p => {
            sqlx::query("INSERT INTO probe (name) VALUES (?)")
                .bind(name)
                .execute(p)
                .await?
                .inserted_id()
        });
        Ok(id)
    }

    #[tokio::test]
    async fn test_on_pool_dispatches_to_sqlite() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE probe (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")
            .await
            .unwrap();

        let id = insert_probe(&pool, "first").await.unwrap();

        assert_eq!(id, 1);
        assert_eq!(count_rows(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_violation_detected_through_context() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE probe (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")
            .await
            .unwrap();
        pool.execute("INSERT INTO probe (name) VALUES ('dup')").await.unwrap();

        let sqlite = pool.as_sqlite().unwrap();
        let err = sqlx::query("INSERT INTO probe (name) VALUES ('dup')")
            .execute(sqlite)
            .await
            .context("insert probe")
            .unwrap_err();

        assert!(is_unique_violation(&err));
        assert!(!is_foreign_key_violation(&err));
    }
}
