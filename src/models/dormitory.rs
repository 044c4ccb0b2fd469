//! Boarding rooms and bed allocations

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DormRoom {
    pub id: i64,
    pub name: String,
    pub block: Option<String>,
    pub gender: Option<String>,
    pub capacity: i64,
    /// Active allocations; never exceeds `capacity`
    pub occupancy: i64,
    pub created_at: DateTime<Utc>,
}

impl DormRoom {
    pub fn free_beds(&self) -> i64 {
        (self.capacity - self.occupancy).max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BedAllocation {
    pub id: i64,
    pub room_id: i64,
    pub room_name: String,
    pub student_id: i64,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub allocated_on: NaiveDate,
    pub vacated_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}
