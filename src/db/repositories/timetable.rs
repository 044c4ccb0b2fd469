//! Timetable repository

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{hhmm, ranges_overlap, TimetableSlot};

const SLOT_SELECT: &str = "SELECT t.id, t.class_id, c.name AS class_name, t.subject_id, \
     sub.code AS subject_code, t.teacher_id, u.name AS teacher_name, t.day_of_week, \
     t.start_time, t.end_time, t.room, t.created_at \
     FROM timetable_slots t \
     JOIN classes c ON c.id = t.class_id \
     JOIN subjects sub ON sub.id = t.subject_id \
     JOIN users u ON u.id = t.teacher_id";

#[derive(Debug, Clone, Deserialize)]
pub struct NewSlot {
    pub class_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub day_of_week: i64,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    Created(i64),
    /// Overlaps the slot with this id (same class or same teacher)
    Clash(i64),
}

pub struct TimetableRepository {
    pool: DynDatabasePool,
}

impl TimetableRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Insert a slot unless it overlaps another slot of the same class or
    /// teacher on that day. Check and insert share one transaction.
    pub async fn create(&self, input: &NewSlot) -> Result<SlotOutcome> {
        let wanted = (input.start_time, input.end_time);
        let outcome = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let same_day = sqlx::query_as::<_, (i64, NaiveTime, NaiveTime)>(
                "SELECT id, start_time, end_time FROM timetable_slots \
                 WHERE day_of_week = ? AND (class_id = ? OR teacher_id = ?)",
            )
            .bind(input.day_of_week)
            .bind(input.class_id)
            .bind(input.teacher_id)
            .fetch_all(&mut *tx)
            .await?;

            match same_day.iter().find(|(_, start, end)| ranges_overlap(wanted, (*start, *end))) {
                Some((clash_id, _, _)) => SlotOutcome::Clash(*clash_id),
                None => {
                    let id = sqlx::query(
                        "INSERT INTO timetable_slots (class_id, subject_id, teacher_id, day_of_week, start_time, end_time, room) \
                         VALUES (?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(input.class_id)
                    .bind(input.subject_id)
                    .bind(input.teacher_id)
                    .bind(input.day_of_week)
                    .bind(input.start_time)
                    .bind(input.end_time)
                    .bind(&input.room)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to insert timetable slot")?
                    .inserted_id();
                    tx.commit().await.context("Failed to commit timetable slot")?;
                    SlotOutcome::Created(id)
                }
            }
        });
        Ok(outcome)
    }

    pub async fn get(&self, id: i64) -> Result<Option<TimetableSlot>> {
        let sql = format!("{} WHERE t.id = ?", SLOT_SELECT);
        let slot = on_pool!(self.pool, p => {
            sqlx::query_as::<_, TimetableSlot>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(slot)
    }

    /// Week view filtered by class and/or teacher
    pub async fn list(&self, class_id: Option<i64>, teacher_id: Option<i64>) -> Result<Vec<TimetableSlot>> {
        let mut conditions: Vec<&str> = Vec::new();
        if class_id.is_some() {
            conditions.push("t.class_id = ?");
        }
        if teacher_id.is_some() {
            conditions.push("t.teacher_id = ?");
        }
        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("{}{} ORDER BY t.day_of_week, t.start_time, c.name", SLOT_SELECT, where_sql);

        let slots = on_pool!(self.pool, p => {
            let mut query = sqlx::query_as::<_, TimetableSlot>(&sql);
            if let Some(class_id) = class_id {
                query = query.bind(class_id);
            }
            if let Some(teacher_id) = teacher_id {
                query = query.bind(teacher_id);
            }
            query.fetch_all(p).await?
        });
        Ok(slots)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM timetable_slots WHERE id = ?")
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

    async fn seeded() -> TimetableRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        for sql in [
            "INSERT INTO users (name, email, password_hash, role) VALUES ('Mr. Kamau', 'k@s.test', 'x', 'teacher')",
            "INSERT INTO users (name, email, password_hash, role) VALUES ('Ms. Wanjiru', 'w@s.test', 'x', 'teacher')",
            "INSERT INTO classes (name) VALUES ('Form 1')",
            "INSERT INTO classes (name) VALUES ('Form 2')",
            "INSERT INTO subjects (name, code) VALUES ('English', 'ENG')",
        ] {
            pool.execute(sql).await.unwrap();
        }
        TimetableRepository::new(pool)
    }

    fn slot(class_id: i64, teacher_id: i64, start: &str, end: &str) -> NewSlot {
        NewSlot {
            class_id,
            subject_id: 1,
            teacher_id,
            day_of_week: 1,
            start_time: hhmm::parse(start).unwrap(),
            end_time: hhmm::parse(end).unwrap(),
            room: None,
        }
    }

    #[tokio::test]
    async fn test_clash_detection() {
        let repo = seeded().await;
        let SlotOutcome::Created(first) = repo.create(&slot(1, 1, "08:00", "09:00")).await.unwrap() else {
            panic!("slot not created");
        };

        // same class, overlapping
        assert_eq!(repo.create(&slot(1, 2, "08:30", "09:30")).await.unwrap(), SlotOutcome::Clash(first));
        // same teacher, other class
        assert_eq!(repo.create(&slot(2, 1, "08:45", "09:15")).await.unwrap(), SlotOutcome::Clash(first));
        // touching is fine
        assert!(matches!(repo.create(&slot(1, 1, "09:00", "10:00")).await.unwrap(), SlotOutcome::Created(_)));
        // unrelated class and teacher
        assert!(matches!(repo.create(&slot(2, 2, "08:00", "09:00")).await.unwrap(), SlotOutcome::Created(_)));

        let class_one = repo.list(Some(1), None).await.unwrap();
        assert_eq!(class_one.len(), 2);
        assert_eq!(class_one[0].teacher_name, "Mr. Kamau");
        assert_eq!(class_one[0].start_time, hhmm::parse("08:00").unwrap());
    }
}
