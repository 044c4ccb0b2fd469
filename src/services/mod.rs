//! Services layer - Business logic
//!
//! Services validate input, enforce the rules that span several rows or
//! tables, and turn repository outcomes into `ServiceError`s. Tenant
//! services are built per request from the resolved school's pool; the
//! authentication and platform services are long-lived and shared through
//! `AppState`.

pub mod academics;
pub mod auth;
pub mod dashboard;
pub mod dormitory;
pub mod exams;
pub mod finance;
pub mod library;
pub mod markdown;
pub mod notices;
pub mod password;
pub mod pharmacy;
pub mod platform;
pub mod policy;
pub mod rate_limiter;
pub mod students;
pub mod timetable;
pub mod users;
pub mod website;

pub use academics::AcademicsService;
pub use auth::{AuthService, LoginInput, LoginOutcome};
pub use dashboard::{DashboardService, DashboardSummary};
pub use dormitory::{AllocateInput, DormitoryService};
pub use exams::{competition_ranks, grade_for, ExamService, MarksInput};
pub use finance::FinanceService;
pub use library::{IssueLoanInput, LibraryService, LoanQuery};
pub use markdown::render_markdown;
pub use notices::NoticeService;
pub use password::{hash_password, verify_password};
pub use pharmacy::{DispenseInput, PharmacyService, VisitInput};
pub use platform::{CreateSchoolInput, NewSuperAdmin, PlatformService, UpdateSchoolInput};
pub use policy::{authorize, Capability};
pub use rate_limiter::LoginRateLimiter;
pub use students::StudentService;
pub use timetable::TimetableService;
pub use users::{CreateUserInput, UserService};
pub use website::{generate_slug, ArticleInput, ArticleView, PublicSite, WebsiteService};

use crate::db::{is_foreign_key_violation, is_unique_violation};

/// Errors surfaced by every service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Too many requests: {0}")]
    RateLimited(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Classify a failed write: duplicate keys become `Conflict` with the
    /// given message, dangling references become `Validation`.
    pub fn from_db(err: anyhow::Error, conflict: &str) -> Self {
        if is_unique_violation(&err) {
            ServiceError::Conflict(conflict.to_string())
        } else if is_foreign_key_violation(&err) {
            ServiceError::Validation("Referenced record does not exist".to_string())
        } else {
            ServiceError::Internal(err)
        }
    }

    /// Classify a failed delete: rows still referenced elsewhere are a `Conflict`
    pub fn from_delete(err: anyhow::Error, what: &str) -> Self {
        if is_foreign_key_violation(&err) {
            ServiceError::Conflict(format!("{} is still referenced by other records", what))
        } else {
            ServiceError::Internal(err)
        }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", what, id))
    }
}

/// Trimmed non-empty text or a validation error naming `field`
pub(crate) fn required(field: &str, value: &str) -> ServiceResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(value.to_string())
}

/// Trim optional text, mapping blank to `None`
pub(crate) fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn positive(field: &str, value: i64) -> ServiceResult<i64> {
    if value <= 0 {
        return Err(ServiceError::Validation(format!("{} must be greater than zero", field)));
    }
    Ok(value)
}

pub(crate) fn validate_email(email: &str) -> ServiceResult<String> {
    let email = required("Email", email)?.to_lowercase();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
        .unwrap_or(false);
    if !valid {
        return Err(ServiceError::Validation("Invalid email format".to_string()));
    }
    Ok(email)
}

pub(crate) const MIN_PASSWORD_LENGTH: usize = 8;

pub(crate) fn validate_password(password: &str) -> ServiceResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
