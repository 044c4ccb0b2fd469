//! Student model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    /// Enrolment status
    StudentStatus {
        Active => "active",
        Graduated => "graduated",
        Withdrawn => "withdrawn",
    }
}

impl Default for StudentStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    /// Unique admission number issued by the school
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub date_of_birth: Option<NaiveDate>,
    pub class_id: i64,
    /// Joined from `classes`
    pub class_name: String,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: StudentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
