//! Notice board repository

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{Audience, Notice};

const COLUMNS: &str = "id, title, body, audience, created_by, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotice {
    pub title: String,
    pub body: String,
    pub audience: Audience,
}

pub struct NoticeRepository {
    pool: DynDatabasePool,
}

impl NoticeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: &NewNotice, created_by: Option<i64>) -> Result<Notice> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO notices (title, body, audience, created_by) VALUES (?, ?, ?, ?)")
                .bind(&input.title)
                .bind(&input.body)
                .bind(input.audience.as_str())
                .bind(created_by)
                .execute(p)
                .await
                .context("Failed to insert notice")?
                .inserted_id()
        });

        self.get(id).await?.context("Notice missing after insert")
    }

    pub async fn get(&self, id: i64) -> Result<Option<Notice>> {
        let sql = format!("SELECT {} FROM notices WHERE id = ?", COLUMNS);
        let notice = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Notice>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(notice)
    }

    /// Newest first, restricted to the given audiences
    pub async fn list_for(&self, audiences: &[Audience]) -> Result<Vec<Notice>> {
        if audiences.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; audiences.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM notices WHERE audience IN ({}) ORDER BY created_at DESC, id DESC",
            COLUMNS, placeholders
        );

        let notices = on_pool!(self.pool, p => {
            let mut query = sqlx::query_as::<_, Notice>(&sql);
            for audience in audiences {
                query = query.bind(audience.as_str());
            }
            query.fetch_all(p).await?
        });
        Ok(notices)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM notices WHERE id = ?")
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::Role;

    #[tokio::test]
    async fn test_audience_filtering() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        let repo = NoticeRepository::new(pool);

        for (title, audience) in [
            ("Sports day", Audience::All),
            ("Staff meeting", Audience::Staff),
            ("Exam timetable", Audience::Students),
        ] {
            repo.create(
                &NewNotice {
                    title: title.to_string(),
                    body: "Details inside".to_string(),
                    audience,
                },
                Some(1),
            )
            .await
            .unwrap();
        }

        let student_view = repo.list_for(Audience::visible_to(Role::Student)).await.unwrap();
        let titles: Vec<_> = student_view.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles.len(), 2);
        assert!(!titles.contains(&"Staff meeting"));

        let nurse_view = repo.list_for(Audience::visible_to(Role::Nurse)).await.unwrap();
        assert!(nurse_view.iter().all(|n| n.audience != Audience::Students));
        assert_eq!(repo.list_for(Audience::visible_to(Role::Admin)).await.unwrap().len(), 3);
    }
}
