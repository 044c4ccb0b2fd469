//! Exams, marks and computed results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Exam {
    pub id: i64,
    pub term_id: i64,
    pub name: String,
    /// Maximum score per subject
    pub max_score: f64,
    pub created_at: DateTime<Utc>,
}

/// A recorded mark with student and subject populated
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Mark {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub class_id: i64,
    pub subject_id: i64,
    pub subject_code: String,
    pub subject_name: String,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub subject_id: i64,
    pub subject_code: String,
    pub score: f64,
    pub grade: char,
}

/// One student's line on an exam result sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResult {
    pub student_id: i64,
    pub admission_number: String,
    pub name: String,
    pub subjects: Vec<SubjectScore>,
    pub total: f64,
    /// Mean percentage across the subjects sat
    pub average: f64,
    pub grade: char,
    /// Competition rank within the sheet (ties share a position)
    pub position: usize,
}
