//! Library catalogue and loans

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub total_copies: i64,
    /// Never negative and never above `total_copies`
    pub available_copies: i64,
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn on_loan(&self) -> i64 {
        self.total_copies - self.available_copies
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookLoan {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub student_id: i64,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
    pub returned_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl BookLoan {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.returned_on.is_none() && self.due_on < today
    }
}
