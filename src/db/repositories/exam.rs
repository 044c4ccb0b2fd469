//! Exam and mark repository

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{Exam, Mark};

const EXAM_COLUMNS: &str = "id, term_id, name, max_score, created_at";
const MARK_SELECT: &str = "SELECT m.id, m.exam_id, m.student_id, s.admission_number, s.first_name, \
     s.last_name, s.class_id, m.subject_id, sub.code AS subject_code, sub.name AS subject_name, \
     m.score, m.updated_at \
     FROM marks m \
     JOIN students s ON s.id = m.student_id \
     JOIN subjects sub ON sub.id = m.subject_id";

#[derive(Debug, Clone, Deserialize)]
pub struct NewExam {
    pub term_id: i64,
    pub name: String,
    pub max_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkEntry {
    pub student_id: i64,
    pub score: f64,
}

pub struct ExamRepository {
    pool: DynDatabasePool,
}

impl ExamRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: &NewExam) -> Result<Exam> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO exams (term_id, name, max_score) VALUES (?, ?, ?)")
                .bind(input.term_id)
                .bind(&input.name)
                .bind(input.max_score)
                .execute(p)
                .await
                .context("Failed to insert exam")?
                .inserted_id()
        });

        self.get(id).await?.context("Exam missing after insert")
    }

    pub async fn get(&self, id: i64) -> Result<Option<Exam>> {
        let sql = format!("SELECT {} FROM exams WHERE id = ?", EXAM_COLUMNS);
        let exam = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Exam>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(exam)
    }

    pub async fn list(&self, term_id: Option<i64>) -> Result<Vec<Exam>> {
        let exams = match term_id {
            Some(term_id) => {
                let sql = format!("SELECT {} FROM exams WHERE term_id = ? ORDER BY name", EXAM_COLUMNS);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Exam>(&sql).bind(term_id).fetch_all(p).await?
                })
            }
            None => {
                let sql = format!("SELECT {} FROM exams ORDER BY created_at DESC, id DESC", EXAM_COLUMNS);
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Exam>(&sql).fetch_all(p).await?
                })
            }
        };
        Ok(exams)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM exams WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete exam")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    /// Insert or overwrite the marks of one subject in a single transaction.
    /// Returns the number of entries written.
    pub async fn upsert_marks(
        &self,
        exam_id: i64,
        subject_id: i64,
        entries: &[MarkEntry],
        recorded_by: Option<i64>,
    ) -> Result<usize> {
        on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            for entry in entries {
                let existing = sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM marks WHERE exam_id = ? AND student_id = ? AND subject_id = ?",
                )
                .bind(exam_id)
                .bind(entry.student_id)
                .bind(subject_id)
                .fetch_optional(&mut *tx)
                .await?;

                match existing {
                    Some(mark_id) => {
                        sqlx::query(
                            "UPDATE marks SET score = ?, recorded_by = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                        )
                        .bind(entry.score)
                        .bind(recorded_by)
                        .bind(mark_id)
                        .execute(&mut *tx)
                        .await?;
                    }
                    None => {
                        sqlx::query(
                            "INSERT INTO marks (exam_id, student_id, subject_id, score, recorded_by) VALUES (?, ?, ?, ?, ?)",
                        )
                        .bind(exam_id)
                        .bind(entry.student_id)
                        .bind(subject_id)
                        .bind(entry.score)
                        .bind(recorded_by)
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to record mark for student {}", entry.student_id))?;
                    }
                }
            }
            tx.commit().await.context("Failed to commit marks")?;
        });

        Ok(entries.len())
    }

    /// Marks of an exam, optionally limited to the students of one class
    pub async fn list_marks(&self, exam_id: i64, class_id: Option<i64>) -> Result<Vec<Mark>> {
        let marks = match class_id {
            Some(class_id) => {
                let sql = format!(
                    "{} WHERE m.exam_id = ? AND s.class_id = ? ORDER BY s.admission_number, sub.code",
                    MARK_SELECT
                );
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Mark>(&sql)
                        .bind(exam_id)
                        .bind(class_id)
                        .fetch_all(p)
                        .await?
                })
            }
            None => {
                let sql = format!(
                    "{} WHERE m.exam_id = ? ORDER BY s.admission_number, sub.code",
                    MARK_SELECT
                );
                on_pool!(self.pool, p => {
                    sqlx::query_as::<_, Mark>(&sql).bind(exam_id).fetch_all(p).await?
                })
            }
        };
        Ok(marks)
    }
}
