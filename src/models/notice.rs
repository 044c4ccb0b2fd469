//! Notice board

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

text_enum! {
    Audience {
        All => "all",
        Staff => "staff",
        Students => "students",
    }
}

impl Audience {
    /// Audiences whose notices a role may read
    pub fn visible_to(role: Role) -> &'static [Audience] {
        match role {
            Role::Student => &[Audience::All, Audience::Students],
            Role::SuperAdmin | Role::Admin => Audience::ALL,
            _ => &[Audience::All, Audience::Staff],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notice {
    pub id: i64,
    pub title: String,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub audience: Audience,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}
