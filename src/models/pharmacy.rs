//! School clinic: medication stock, visits and dispensations

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub unit: String,
    pub stock_quantity: i64,
    pub reorder_level: i64,
    pub created_at: DateTime<Utc>,
}

impl Medication {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClinicVisit {
    pub id: i64,
    pub student_id: i64,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub complaint: String,
    pub diagnosis: Option<String>,
    pub visited_on: NaiveDate,
    pub attended_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dispensation {
    pub id: i64,
    pub visit_id: i64,
    pub medication_id: i64,
    pub medication_name: String,
    pub quantity: i64,
    pub dispensed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}
