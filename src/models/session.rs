//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

/// Session stored in the platform registry.
///
/// The identity fields are copied in at login so that authenticating a
/// request never has to open a school database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    pub user_id: i64,
    /// School the user belongs to; `None` for super-admins
    pub school_code: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub name: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn claims(&self) -> Claims {
        Claims {
            user_id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            school_code: self.school_code.clone(),
        }
    }
}

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub school_code: Option<String>,
}

impl Claims {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}
