//! Accounts: school users and platform super-admins

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    /// Role carried in a session claim.
    ///
    /// `SuperAdmin` exists only in the platform registry; every other role
    /// belongs to a user inside one school database.
    Role {
        SuperAdmin => "super_admin",
        Admin => "admin",
        Teacher => "teacher",
        Accountant => "accountant",
        Librarian => "librarian",
        Nurse => "nurse",
        Matron => "matron",
        Student => "student",
    }
}

impl Role {
    /// Roles that may be assigned to a school user
    pub fn is_tenant_role(&self) -> bool {
        !matches!(self, Role::SuperAdmin)
    }

    /// School employees (everyone except students and platform operators)
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::SuperAdmin | Role::Student)
    }
}

/// A user account inside a school database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A platform operator stored in the registry database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SuperAdmin {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_groups() {
        assert!(!Role::SuperAdmin.is_tenant_role());
        assert!(Role::Student.is_tenant_role());
        assert!(Role::Nurse.is_staff());
        assert!(!Role::Student.is_staff());
        assert!(!Role::SuperAdmin.is_staff());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let now = Utc::now();
        let user = User {
            id: 1,
            name: "Ada".into(),
            email: "ada@school.test".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Teacher,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "teacher");
    }
}
