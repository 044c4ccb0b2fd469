//! Student repository

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{Student, StudentStatus};

const SELECT: &str = "SELECT s.id, s.admission_number, s.first_name, s.last_name, s.gender, \
     s.date_of_birth, s.class_id, c.name AS class_name, s.guardian_name, s.guardian_phone, \
     s.status, s.created_at, s.updated_at \
     FROM students s JOIN classes c ON c.id = s.class_id";

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    pub class_id: i64,
    #[serde(default)]
    pub guardian_name: Option<String>,
    #[serde(default)]
    pub guardian_phone: Option<String>,
    #[serde(default)]
    pub status: StudentStatus,
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    pub admission_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub class_id: Option<i64>,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub status: Option<StudentStatus>,
}

/// Listing filters
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class_id: Option<i64>,
    pub status: Option<StudentStatus>,
    /// Matched against names and admission number
    pub q: Option<String>,
}

impl StudentFilter {
    fn where_clause(&self) -> String {
        let mut conditions = Vec::new();
        if self.class_id.is_some() {
            conditions.push("s.class_id = ?");
        }
        if self.status.is_some() {
            conditions.push("s.status = ?");
        }
        if self.search_pattern().is_some() {
            conditions.push("(s.first_name LIKE ? OR s.last_name LIKE ? OR s.admission_number LIKE ?)");
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    fn search_pattern(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q))
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClassHeadcount {
    pub class_id: i64,
    pub class_name: String,
    pub students: i64,
}

pub struct StudentRepository {
    pool: DynDatabasePool,
}

impl StudentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: &NewStudent) -> Result<Student> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO students (admission_number, first_name, last_name, gender, date_of_birth, \
                 class_id, guardian_name, guardian_phone, status) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&input.admission_number)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.gender)
            .bind(input.date_of_birth)
            .bind(input.class_id)
            .bind(&input.guardian_name)
            .bind(&input.guardian_phone)
            .bind(input.status.as_str())
            .execute(p)
            .await
            .context("Failed to insert student")?
            .inserted_id()
        });

        self.get(id).await?.context("Student missing after insert")
    }

    pub async fn get(&self, id: i64) -> Result<Option<Student>> {
        let sql = format!("{} WHERE s.id = ?", SELECT);
        let student = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Student>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(student)
    }

    /// One page of students matching `filter`, with the total match count
    pub async fn list(
        &self,
        filter: &StudentFilter,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Student>, i64)> {
        let where_sql = filter.where_clause();
        let pattern = filter.search_pattern();
        let offset = (page - 1).max(0) * per_page;

        let list_sql = format!(
            "{}{} ORDER BY s.last_name, s.first_name LIMIT ? OFFSET ?",
            SELECT, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM students s{}", where_sql);

        let (students, total) = on_pool!(self.pool, p => {
            let mut list = sqlx::query_as::<_, Student>(&list_sql);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            if let Some(class_id) = filter.class_id {
                list = list.bind(class_id);
                count = count.bind(class_id);
            }
            if let Some(status) = filter.status {
                list = list.bind(status.as_str());
                count = count.bind(status.as_str());
            }
            if let Some(pattern) = &pattern {
                for _ in 0..3 {
                    list = list.bind(pattern.clone());
                    count = count.bind(pattern.clone());
                }
            }
            let students = list.bind(per_page).bind(offset).fetch_all(p).await?;
            let total = count.fetch_one(p).await?;
            (students, total)
        });

        Ok((students, total))
    }

    pub async fn update(&self, id: i64, update: &StudentUpdate) -> Result<Option<Student>> {
        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };

        on_pool!(self.pool, p => {
            sqlx::query(
                "UPDATE students SET admission_number = ?, first_name = ?, last_name = ?, gender = ?, \
                 date_of_birth = ?, class_id = ?, guardian_name = ?, guardian_phone = ?, status = ?, \
                 updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(update.admission_number.as_ref().unwrap_or(&current.admission_number))
            .bind(update.first_name.as_ref().unwrap_or(&current.first_name))
            .bind(update.last_name.as_ref().unwrap_or(&current.last_name))
            .bind(update.gender.as_ref().unwrap_or(&current.gender))
            .bind(update.date_of_birth.or(current.date_of_birth))
            .bind(update.class_id.unwrap_or(current.class_id))
            .bind(update.guardian_name.as_ref().or(current.guardian_name.as_ref()))
            .bind(update.guardian_phone.as_ref().or(current.guardian_phone.as_ref()))
            .bind(update.status.unwrap_or(current.status).as_str())
            .bind(id)
            .execute(p)
            .await
            .context("Failed to update student")?;
        });

        self.get(id).await
    }

    pub async fn count_by_status(&self, status: StudentStatus) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(p)
                .await?
        });
        Ok(count)
    }

    /// Active students per class, including empty classes
    pub async fn count_per_class(&self) -> Result<Vec<ClassHeadcount>> {
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, ClassHeadcount>(
                "SELECT c.id AS class_id, c.name AS class_name, COUNT(s.id) AS students \
                 FROM classes c LEFT JOIN students s ON s.class_id = c.id AND s.status = ? \
                 GROUP BY c.id, c.name ORDER BY c.name",
            )
            .bind(StudentStatus::Active.as_str())
            .fetch_all(p)
            .await?
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::academics::{AcademicsRepository, NewClass};
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    async fn setup() -> (StudentRepository, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        let class = AcademicsRepository::new(pool.clone())
            .create_class(&NewClass {
                name: "Form 2B".to_string(),
                class_teacher_id: None,
            })
            .await
            .unwrap();
        (StudentRepository::new(pool), class.id)
    }

    fn student(adm: &str, first: &str, class_id: i64) -> NewStudent {
        NewStudent {
            admission_number: adm.to_string(),
            first_name: first.to_string(),
            last_name: "Otieno".to_string(),
            gender: "female".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 3, 14),
            class_id,
            guardian_name: None,
            guardian_phone: None,
            status: StudentStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_create_populates_class_name() {
        let (repo, class_id) = setup().await;
        let created = repo.create(&student("ADM-1", "Amina", class_id)).await.unwrap();
        assert_eq!(created.class_name, "Form 2B");
        assert_eq!(created.status, StudentStatus::Active);

        let err = repo.create(&student("ADM-1", "Brian", class_id)).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_filtered_paged_listing() {
        let (repo, class_id) = setup().await;
        for (i, name) in ["Amina", "Brian", "Chloe", "Daudi"].iter().enumerate() {
            repo.create(&student(&format!("ADM-{}", i), name, class_id)).await.unwrap();
        }

        let filter = StudentFilter {
            q: Some("ch".to_string()),
            ..Default::default()
        };
        let (found, total) = repo.list(&filter, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].first_name, "Chloe");

        let (page, total) = repo.list(&StudentFilter::default(), 2, 3).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_update_and_counts() {
        let (repo, class_id) = setup().await;
        let created = repo.create(&student("ADM-9", "Esther", class_id)).await.unwrap();

        let update = StudentUpdate {
            status: Some(StudentStatus::Graduated),
            ..Default::default()
        };
        let updated = repo.update(created.id, &update).await.unwrap().unwrap();
        assert_eq!(updated.status, StudentStatus::Graduated);
        assert_eq!(updated.first_name, "Esther");

        assert_eq!(repo.count_by_status(StudentStatus::Active).await.unwrap(), 0);
        let per_class = repo.count_per_class().await.unwrap();
        assert_eq!(per_class.len(), 1);
        assert_eq!(per_class[0].students, 0);
    }
}
