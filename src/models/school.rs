//! School (tenant) registry entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A school registered on the platform.
///
/// The connection URL is never serialized as-is; API responses expose the
/// redacted form only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct School {
    pub id: i64,
    /// Unique lowercase code used in URLs
    pub code: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub database_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
