//! Academic calendar and reference data repository
//!
//! Years and terms carry the "exactly one active" rule, so activation is a
//! single transaction that clears every other flag before setting the target.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{AcademicYear, SchoolClass, Subject, Term};

const YEAR_COLUMNS: &str = "id, name, start_date, end_date, is_active, created_at";
const TERM_COLUMNS: &str = "id, academic_year_id, name, start_date, end_date, is_active, created_at";
const CLASS_COLUMNS: &str = "c.id, c.name, c.class_teacher_id, c.created_at, \
     (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.status = 'active') AS student_count";
const SUBJECT_COLUMNS: &str = "id, name, code, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewAcademicYear {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTerm {
    pub academic_year_id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewClass {
    pub name: String,
    #[serde(default)]
    pub class_teacher_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubject {
    pub name: String,
    pub code: String,
}

pub struct AcademicsRepository {
    pool: DynDatabasePool,
}

impl AcademicsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    // Academic years

    /// Insert a year; the first year of a school is created active.
    pub async fn create_year(&self, input: &NewAcademicYear) -> Result<AcademicYear> {
        let id = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM academic_years")
                .fetch_one(&mut *tx)
                .await?;
            let id = sqlx::query(
                "INSERT INTO academic_years (name, start_date, end_date, is_active) VALUES (?, ?, ?, ?)",
            )
            .bind(&input.name)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(existing == 0)
            .execute(&mut *tx)
            .await
            .context("Failed to insert academic year")?
            .inserted_id();
            tx.commit().await?;
            id
        });

        self.get_year(id).await?.context("Academic year missing after insert")
    }

    pub async fn get_year(&self, id: i64) -> Result<Option<AcademicYear>> {
        let sql = format!("SELECT {} FROM academic_years WHERE id = ?", YEAR_COLUMNS);
        let year = on_pool!(self.pool, p => {
            sqlx::query_as::<_, AcademicYear>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(year)
    }

    pub async fn list_years(&self) -> Result<Vec<AcademicYear>> {
        let sql = format!("SELECT {} FROM academic_years ORDER BY start_date DESC", YEAR_COLUMNS);
        let years = on_pool!(self.pool, p => {
            sqlx::query_as::<_, AcademicYear>(&sql).fetch_all(p).await?
        });
        Ok(years)
    }

    pub async fn active_year(&self) -> Result<Option<AcademicYear>> {
        let sql = format!("SELECT {} FROM academic_years WHERE is_active = ?", YEAR_COLUMNS);
        let year = on_pool!(self.pool, p => {
            sqlx::query_as::<_, AcademicYear>(&sql).bind(true).fetch_optional(p).await?
        });
        Ok(year)
    }

    /// Make `id` the only active year. Terms of other years are deactivated
    /// with it. Returns `false` when the year does not exist.
    pub async fn activate_year(&self, id: i64) -> Result<bool> {
        let found = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM academic_years WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            if exists == 0 {
                false
            } else {
                sqlx::query("UPDATE academic_years SET is_active = ? WHERE id <> ?")
                    .bind(false)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE academic_years SET is_active = ? WHERE id = ?")
                    .bind(true)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE terms SET is_active = ? WHERE academic_year_id <> ?")
                    .bind(false)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await.context("Failed to activate academic year")?;
                true
            }
        });
        Ok(found)
    }

    pub async fn delete_year(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM academic_years WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete academic year")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    // Terms

    pub async fn create_term(&self, input: &NewTerm) -> Result<Term> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO terms (academic_year_id, name, start_date, end_date) VALUES (?, ?, ?, ?)",
            )
            .bind(input.academic_year_id)
            .bind(&input.name)
            .bind(input.start_date)
            .bind(input.end_date)
            .execute(p)
            .await
            .context("Failed to insert term")?
            .inserted_id()
        });

        self.get_term(id).await?.context("Term missing after insert")
    }

    pub async fn get_term(&self, id: i64) -> Result<Option<Term>> {
        let sql = format!("SELECT {} FROM terms WHERE id = ?", TERM_COLUMNS);
        let term = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Term>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(term)
    }

    pub async fn list_terms(&self, academic_year_id: Option<i64>) -> Result<Vec<Term>> {
        let terms = match academic_year_id {
            Some(year_id) => {
                let sql = format!(
                    "SELECT {} FROM terms WHERE academic_year_id = ? ORDER BY start_date",
                    TERM_COLUMNS
                );
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Term>(&sql).bind(year_id).fetch_all(p).await?
                })
            }
            None => {
                let sql = format!("SELECT {} FROM terms ORDER BY start_date", TERM_COLUMNS);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Term>(&sql).fetch_all(p).await?
                })
            }
        };
        Ok(terms)
    }

    pub async fn active_term(&self) -> Result<Option<Term>> {
        let sql = format!("SELECT {} FROM terms WHERE is_active = ?", TERM_COLUMNS);
        let term = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Term>(&sql).bind(true).fetch_optional(p).await?
        });
        Ok(term)
    }

    /// Make `id` the only active term
    pub async fn activate_term(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            sqlx::query("UPDATE terms SET is_active = ? WHERE id <> ?")
                .bind(false)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE terms SET is_active = ? WHERE id = ?")
                .bind(true)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await.context("Failed to activate term")?;
        });
        Ok(())
    }

    pub async fn delete_term(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM terms WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete term")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    // Classes

    pub async fn create_class(&self, input: &NewClass) -> Result<SchoolClass> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO classes (name, class_teacher_id) VALUES (?, ?)")
                .bind(&input.name)
                .bind(input.class_teacher_id)
                .execute(p)
                .await
                .context("Failed to insert class")?
                .inserted_id()
        });

        self.get_class(id).await?.context("Class missing after insert")
    }

    pub async fn get_class(&self, id: i64) -> Result<Option<SchoolClass>> {
        let sql = format!("SELECT {} FROM classes c WHERE c.id = ?", CLASS_COLUMNS);
        let class = on_pool!(self.pool, p => {
            sqlx::query_as::<_, SchoolClass>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(class)
    }

    pub async fn list_classes(&self) -> Result<Vec<SchoolClass>> {
        let sql = format!("SELECT {} FROM classes c ORDER BY c.name", CLASS_COLUMNS);
        let classes = on_pool!(self.pool, p => {
            sqlx::query_as::<_, SchoolClass>(&sql).fetch_all(p).await?
        });
        Ok(classes)
    }

    pub async fn count_classes(&self) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM classes").fetch_one(p).await?
        });
        Ok(count)
    }

    /// Students of any status still assigned to the class
    pub async fn enrolled_in_class(&self, class_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students WHERE class_id = ?")
                .bind(class_id)
                .fetch_one(p)
                .await?
        });
        Ok(count)
    }

    pub async fn delete_class(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM classes WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete class")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    // Subjects

    pub async fn create_subject(&self, input: &NewSubject) -> Result<Subject> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO subjects (name, code) VALUES (?, ?)")
                .bind(&input.name)
                .bind(&input.code)
                .execute(p)
                .await
                .context("Failed to insert subject")?
                .inserted_id()
        });

        self.get_subject(id).await?.context("Subject missing after insert")
    }

    pub async fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        let sql = format!("SELECT {} FROM subjects WHERE id = ?", SUBJECT_COLUMNS);
        let subject = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Subject>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(subject)
    }

    pub async fn list_subjects(&self) -> Result<Vec<Subject>> {
        let sql = format!("SELECT {} FROM subjects ORDER BY name", SUBJECT_COLUMNS);
        let subjects = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Subject>(&sql).fetch_all(p).await?
        });
        Ok(subjects)
    }

    pub async fn delete_subject(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM subjects WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete subject")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn repo() -> AcademicsRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        AcademicsRepository::new(pool)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn year(name: &str, y: i32) -> NewAcademicYear {
        NewAcademicYear {
            name: name.to_string(),
            start_date: date(y, 1, 10),
            end_date: date(y, 11, 30),
        }
    }

    #[tokio::test]
    async fn test_first_year_is_active() {
        let repo = repo().await;
        let first = repo.create_year(&year("2025", 2025)).await.unwrap();
        let second = repo.create_year(&year("2026", 2026)).await.unwrap();
        assert!(first.is_active);
        assert!(!second.is_active);
        assert_eq!(repo.active_year().await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_activate_year_leaves_exactly_one_active() {
        let repo = repo().await;
        let first = repo.create_year(&year("2025", 2025)).await.unwrap();
        let second = repo.create_year(&year("2026", 2026)).await.unwrap();
        let term = repo
            .create_term(&NewTerm {
                academic_year_id: first.id,
                name: "Term 1".to_string(),
                start_date: date(2025, 1, 10),
                end_date: date(2025, 4, 5),
            })
            .await
            .unwrap();
        repo.activate_term(term.id).await.unwrap();

        assert!(repo.activate_year(second.id).await.unwrap());
        let active: Vec<_> = repo
            .list_years()
            .await
            .unwrap()
            .into_iter()
            .filter(|y| y.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert!(repo.active_term().await.unwrap().is_none());

        assert!(!repo.activate_year(404).await.unwrap());
    }

    #[tokio::test]
    async fn test_class_student_count() {
        let repo = repo().await;
        let class = repo
            .create_class(&NewClass {
                name: "Form 1A".to_string(),
                class_teacher_id: None,
            })
            .await
            .unwrap();
        assert_eq!(class.student_count, 0);
        assert_eq!(repo.enrolled_in_class(class.id).await.unwrap(), 0);
        assert!(repo.delete_class(class.id).await.unwrap());
        assert!(repo.list_classes().await.unwrap().is_empty());
    }
}
