//! Dormitory repository
//!
//! Occupancy is the count of allocations without `vacated_on`; it is
//! computed, never stored.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::{on_pool, DynDatabasePool, InsertedId};
use crate::models::{BedAllocation, DormRoom};

const ROOM_SELECT: &str = "SELECT r.id, r.name, r.block, r.gender, r.capacity, \
     (SELECT COUNT(*) FROM bed_allocations a WHERE a.room_id = r.id AND a.vacated_on IS NULL) AS occupancy, \
     r.created_at FROM dorm_rooms r";
const ALLOCATION_SELECT: &str = "SELECT a.id, a.room_id, r.name AS room_name, a.student_id, \
     s.admission_number, s.first_name, s.last_name, a.allocated_on, a.vacated_on, a.created_at \
     FROM bed_allocations a \
     JOIN dorm_rooms r ON r.id = a.room_id \
     JOIN students s ON s.id = a.student_id";

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub name: String,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    pub capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomChange {
    Done,
    NotFound,
    /// More students are allocated than the requested change allows
    Occupied(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocateOutcome {
    Allocated(i64),
    RoomNotFound,
    RoomFull,
    StudentAlreadyAllocated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VacateOutcome {
    Vacated,
    NotFound,
    AlreadyVacated,
}

pub struct DormitoryRepository {
    pool: DynDatabasePool,
}

impl DormitoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub async fn create_room(&self, input: &NewRoom) -> Result<DormRoom> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO dorm_rooms (name, block, gender, capacity) VALUES (?, ?, ?, ?)")
                .bind(&input.name)
                .bind(&input.block)
                .bind(&input.gender)
                .bind(input.capacity)
                .execute(p)
                .await
                .context("Failed to insert room")?
                .inserted_id()
        });

        self.get_room(id).await?.context("Room missing after insert")
    }

    pub async fn get_room(&self, id: i64) -> Result<Option<DormRoom>> {
        let sql = format!("{} WHERE r.id = ?", ROOM_SELECT);
        let room = on_pool!(self.pool, p => {
            sqlx::query_as::<_, DormRoom>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(room)
    }

    pub async fn list_rooms(&self) -> Result<Vec<DormRoom>> {
        let sql = format!("{} ORDER BY r.block, r.name", ROOM_SELECT);
        let rooms = on_pool!(self.pool, p => {
            sqlx::query_as::<_, DormRoom>(&sql).fetch_all(p).await?
        });
        Ok(rooms)
    }

    /// Change capacity; refused when below the current occupancy
    pub async fn update_capacity(&self, id: i64, capacity: i64) -> Result<RoomChange> {
        let change = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dorm_rooms WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            let occupancy = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM bed_allocations WHERE room_id = ? AND vacated_on IS NULL",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            if exists == 0 {
                RoomChange::NotFound
            } else if capacity < occupancy {
                RoomChange::Occupied(occupancy)
            } else {
                sqlx::query("UPDATE dorm_rooms SET capacity = ? WHERE id = ?")
                    .bind(capacity)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await.context("Failed to update room capacity")?;
                RoomChange::Done
            }
        });
        Ok(change)
    }

    /// Delete a room with no current occupants, along with its history
    pub async fn delete_room(&self, id: i64) -> Result<RoomChange> {
        let change = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dorm_rooms WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            let occupancy = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM bed_allocations WHERE room_id = ? AND vacated_on IS NULL",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            if exists == 0 {
                RoomChange::NotFound
            } else if occupancy > 0 {
                RoomChange::Occupied(occupancy)
            } else {
                sqlx::query("DELETE FROM bed_allocations WHERE room_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM dorm_rooms WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await.context("Failed to delete room")?;
                RoomChange::Done
            }
        });
        Ok(change)
    }

    /// Give a student a bed. A student holds at most one active allocation
    /// and occupancy never exceeds capacity.
    pub async fn allocate(
        &self,
        room_id: i64,
        student_id: i64,
        allocated_on: NaiveDate,
    ) -> Result<AllocateOutcome> {
        let outcome = on_pool!(self.pool, p => {
            let mut tx = p.begin().await?;
            // Row locks on the student and the room serialise competing allocations
            // before anything is counted.
            sqlx::query("UPDATE students SET status = status WHERE id = ?")
                .bind(student_id)
                .execute(&mut *tx)
                .await
                .context("Failed to lock student")?;
            sqlx::query("UPDATE dorm_rooms SET capacity = capacity WHERE id = ?")
                .bind(room_id)
                .execute(&mut *tx)
                .await
                .context("Failed to lock room")?;
            let capacity = sqlx::query_scalar::<_, i64>("SELECT capacity FROM dorm_rooms WHERE id = ?")
                .bind(room_id)
                .fetch_optional(&mut *tx)
                .await?;
            let occupancy = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM bed_allocations WHERE room_id = ? AND vacated_on IS NULL",
            )
            .bind(room_id)
            .fetch_one(&mut *tx)
            .await?;
            let held = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM bed_allocations WHERE student_id = ? AND vacated_on IS NULL",
            )
            .bind(student_id)
            .fetch_one(&mut *tx)
            .await?;

            match capacity {
                None => AllocateOutcome::RoomNotFound,
                Some(_) if held > 0 => AllocateOutcome::StudentAlreadyAllocated,
                Some(capacity) if occupancy >= capacity => AllocateOutcome::RoomFull,
                Some(_) => {
                    let id = sqlx::query(
                        "INSERT INTO bed_allocations (room_id, student_id, allocated_on) VALUES (?, ?, ?)",
                    )
                    .bind(room_id)
                    .bind(student_id)
                    .bind(allocated_on)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to insert allocation")?
                    .inserted_id();
                    tx.commit().await.context("Failed to commit allocation")?;
                    AllocateOutcome::Allocated(id)
                }
            }
        });
        Ok(outcome)
    }

    pub async fn vacate(&self, allocation_id: i64, vacated_on: NaiveDate) -> Result<VacateOutcome> {
        let current = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, Option<NaiveDate>>(
                "SELECT vacated_on FROM bed_allocations WHERE id = ?",
            )
            .bind(allocation_id)
            .fetch_optional(p)
            .await?
        });

        match current {
            None => Ok(VacateOutcome::NotFound),
            Some(Some(_)) => Ok(VacateOutcome::AlreadyVacated),
            Some(None) => {
                let affected = on_pool!(self.pool, p => {
                    sqlx::query(
                        "UPDATE bed_allocations SET vacated_on = ? WHERE id = ? AND vacated_on IS NULL",
                    )
                    .bind(vacated_on)
                    .bind(allocation_id)
                    .execute(p)
                    .await
                    .context("Failed to vacate bed")?
                    .rows_affected()
                });
                if affected == 0 {
                    Ok(VacateOutcome::AlreadyVacated)
                } else {
                    Ok(VacateOutcome::Vacated)
                }
            }
        }
    }

    pub async fn get_allocation(&self, id: i64) -> Result<Option<BedAllocation>> {
        let sql = format!("{} WHERE a.id = ?", ALLOCATION_SELECT);
        let allocation = on_pool!(self.pool, p => {
            sqlx::query_as::<_, BedAllocation>(&sql).bind(id).fetch_optional(p).await?
        });
        Ok(allocation)
    }

    /// Allocations, optionally for one room; `active_only` hides vacated beds
    pub async fn list_allocations(&self, room_id: Option<i64>, active_only: bool) -> Result<Vec<BedAllocation>> {
        let mut conditions: Vec<&str> = Vec::new();
        if room_id.is_some() {
            conditions.push("a.room_id = ?");
        }
        if active_only {
            conditions.push("a.vacated_on IS NULL");
        }
        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("{}{} ORDER BY r.name, s.last_name", ALLOCATION_SELECT, where_sql);

        let rows = on_pool!(self.pool, p => {
            let mut query = sqlx::query_as::<_, BedAllocation>(&sql);
            if let Some(room_id) = room_id {
                query = query.bind(room_id);
            }
            query.fetch_all(p).await?
        });
        Ok(rows)
    }

    pub async fn count_occupied(&self) -> Result<i64> {
        let count = on_pool!(self.pool, p => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bed_allocations WHERE vacated_on IS NULL")
                .fetch_one(p)
                .await?
        });
        Ok(count)
    }
}
