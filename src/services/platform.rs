//! Platform (super-admin) service
//!
//! Provisioning of schools and of the super-admin accounts that manage them.
//! A school row is only kept when its database can be reached and migrated.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use super::password::hash_password;
use super::{optional, required, validate_email, validate_password, ServiceError, ServiceResult};
use crate::db::repositories::{
    NewUser, SchoolRecord, SchoolRepository, SessionRepository, SqlxUserRepository,
    SuperAdminRepository, UserRepository,
};
use crate::models::{Role, School, SuperAdmin};
use crate::tenancy::{normalize_code, TenantRouter};

static SCHOOL_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9-]{1,31}$").expect("school code pattern is valid")
});

/// Normalise and check a school code
pub fn validate_school_code(code: &str) -> ServiceResult<String> {
    let code = normalize_code(code);
    if !SCHOOL_CODE.is_match(&code) {
        return Err(ServiceError::Validation(
            "School code must be 2-32 characters of a-z, 0-9 and '-', not starting with '-'"
                .to_string(),
        ));
    }
    Ok(code)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSchoolInput {
    pub code: String,
    pub name: String,
    pub database_url: String,
    #[serde(default)]
    pub admin_name: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSchoolInput {
    pub name: Option<String>,
    pub database_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSuperAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// First administrator seeded into a new school
struct SeedAdmin {
    name: String,
    email: String,
    password: String,
}

pub struct PlatformService {
    schools: Arc<dyn SchoolRepository>,
    super_admins: Arc<dyn SuperAdminRepository>,
    sessions: Arc<dyn SessionRepository>,
    router: Arc<TenantRouter>,
}

impl PlatformService {
    pub fn new(
        schools: Arc<dyn SchoolRepository>,
        super_admins: Arc<dyn SuperAdminRepository>,
        sessions: Arc<dyn SessionRepository>,
        router: Arc<TenantRouter>,
    ) -> Self {
        Self {
            schools,
            super_admins,
            sessions,
            router,
        }
    }

    pub async fn create_school(&self, input: CreateSchoolInput) -> ServiceResult<School> {
        let code = validate_school_code(&input.code)?;
        let name = required("School name", &input.name)?;
        let database_url = required("Database URL", &input.database_url)?;
        let seed = Self::seed_admin(&input)?;

        if self.schools.get_by_code(&code).await?.is_some() {
            return Err(ServiceError::Conflict(format!("School code '{}' is already taken", code)));
        }

        let school = self
            .schools
            .create(&SchoolRecord {
                code: code.clone(),
                name,
                database_url,
                is_active: true,
            })
            .await
            .map_err(|e| ServiceError::from_db(e, "School code is already taken"))?;

        let tenant = match self.router.resolve(&code).await {
            Ok(tenant) => tenant,
            Err(e) => {
                tracing::warn!("Provisioning of school {} failed: {}", code, e);
                self.schools.delete(&code).await?;
                self.router.invalidate(&code).await;
                return Err(ServiceError::Validation(format!(
                    "Cannot prepare the school database: {}",
                    e
                )));
            }
        };

        if let Some(seed) = seed {
            let users = SqlxUserRepository::new(tenant.db);
            if users.get_by_email(&seed.email).await?.is_some() {
                tracing::warn!("School {} already has a user {}, not seeding", code, seed.email);
            } else {
                users
                    .create(&NewUser {
                        name: seed.name,
                        email: seed.email,
                        password_hash: hash_password(&seed.password)?,
                        role: Role::Admin,
                    })
                    .await?;
            }
        }

        tracing::info!("Provisioned school {}", code);
        Ok(school)
    }

    fn seed_admin(input: &CreateSchoolInput) -> ServiceResult<Option<SeedAdmin>> {
        let name = optional(&input.admin_name);
        let email = optional(&input.admin_email);
        let password = input.admin_password.clone().filter(|p| !p.is_empty());

        match (name, email, password) {
            (None, None, None) => Ok(None),
            (Some(name), Some(email), Some(password)) => {
                validate_password(&password)?;
                Ok(Some(SeedAdmin {
                    name,
                    email: validate_email(&email)?,
                    password,
                }))
            }
            _ => Err(ServiceError::Validation(
                "admin_name, admin_email and admin_password must be given together".to_string(),
            )),
        }
    }

    pub async fn list_schools(&self) -> ServiceResult<Vec<School>> {
        Ok(self.schools.list().await?)
    }

    pub async fn get_school(&self, code: &str) -> ServiceResult<School> {
        let code = normalize_code(code);
        self.schools
            .get_by_code(&code)
            .await?
            .ok_or_else(|| ServiceError::not_found("School", &code))
    }

    /// Edit a school. A new URL on an active school must be reachable, or
    /// the change is reverted.
    pub async fn update_school(&self, code: &str, input: UpdateSchoolInput) -> ServiceResult<School> {
        let current = self.get_school(code).await?;

        let name = match &input.name {
            Some(name) => required("School name", name)?,
            None => current.name.clone(),
        };
        let database_url = match &input.database_url {
            Some(url) => required("Database URL", url)?,
            None => current.database_url.clone(),
        };
        let is_active = input.is_active.unwrap_or(current.is_active);
        let url_changed = database_url != current.database_url;

        let record = SchoolRecord {
            code: current.code.clone(),
            name,
            database_url,
            is_active,
        };
        let updated = self
            .schools
            .update(&record)
            .await?
            .ok_or_else(|| ServiceError::not_found("School", &current.code))?;

        if url_changed || is_active != current.is_active {
            self.router.invalidate(&current.code).await;
        }

        if url_changed && is_active {
            if let Err(e) = self.router.resolve(&current.code).await {
                let restore = SchoolRecord {
                    database_url: current.database_url.clone(),
                    ..record
                };
                self.schools.update(&restore).await?;
                self.router.invalidate(&current.code).await;
                return Err(ServiceError::Validation(format!(
                    "Cannot prepare the school database: {}",
                    e
                )));
            }
        }

        if current.is_active && !is_active {
            let revoked = self.sessions.delete_by_school(&current.code).await?;
            tracing::info!("Deactivated school {} and ended {} sessions", current.code, revoked);
        }

        Ok(updated)
    }

    pub async fn deactivate_school(&self, code: &str) -> ServiceResult<School> {
        self.update_school(
            code,
            UpdateSchoolInput {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn list_super_admins(&self) -> ServiceResult<Vec<SuperAdmin>> {
        Ok(self.super_admins.list().await?)
    }

    pub async fn create_super_admin(&self, input: NewSuperAdmin) -> ServiceResult<SuperAdmin> {
        let name = required("Name", &input.name)?;
        let email = validate_email(&input.email)?;
        validate_password(&input.password)?;

        if self.super_admins.get_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!("Email '{}' is already registered", email)));
        }

        let hash = hash_password(&input.password)?;
        self.super_admins
            .create(&name, &email, &hash)
            .await
            .map_err(|e| ServiceError::from_db(e, "Email is already registered"))
    }
}
