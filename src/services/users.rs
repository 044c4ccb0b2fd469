//! School user accounts (staff and students)

use serde::Deserialize;

use super::password::hash_password;
use super::{required, validate_email, validate_password, ServiceError, ServiceResult};
use crate::db::repositories::{NewUser, SqlxUserRepository, UserRepository, UserUpdate};
use crate::db::DynDatabasePool;
use crate::models::{Role, User};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

pub struct UserService {
    users: SqlxUserRepository,
}

fn tenant_role(role: Role) -> ServiceResult<Role> {
    if !role.is_tenant_role() {
        return Err(ServiceError::Validation(
            "super_admin is not a school role".to_string(),
        ));
    }
    Ok(role)
}

impl UserService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            users: SqlxUserRepository::new(db),
        }
    }

    pub async fn list(&self, role: Option<Role>) -> ServiceResult<Vec<User>> {
        Ok(self.users.list(role).await?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<User> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn create(&self, input: CreateUserInput) -> ServiceResult<User> {
        let name = required("Name", &input.name)?;
        let email = validate_email(&input.email)?;
        validate_password(&input.password)?;
        let role = tenant_role(input.role)?;

        if self.users.get_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!("Email '{}' is already registered", email)));
        }

        self.users
            .create(&NewUser {
                name,
                email,
                password_hash: hash_password(&input.password)?,
                role,
            })
            .await
            .map_err(|e| ServiceError::from_db(e, "Email is already registered"))
    }

    pub async fn update(&self, id: i64, update: UserUpdate) -> ServiceResult<User> {
        let update = UserUpdate {
            name: update.name.as_deref().map(|n| required("Name", n)).transpose()?,
            role: update.role.map(tenant_role).transpose()?,
            is_active: update.is_active,
        };

        self.users
            .update(id, &update)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn set_password(&self, id: i64, password: &str) -> ServiceResult<()> {
        validate_password(password)?;
        let hash = hash_password(password)?;
        if !self.users.update_password(id, &hash).await? {
            return Err(ServiceError::not_found("User", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::services::verify_password;

    async fn service() -> UserService {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        UserService::new(pool)
    }

    fn input(email: &str, role: Role) -> CreateUserInput {
        CreateUserInput {
            name: "Amina Okello".to_string(),
            email: email.to_string(),
            password: "chalkboard".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_create_normalises_email_and_rejects_duplicates() {
        let service = service().await;
        let user = service.create(input("Amina@School.Test", Role::Teacher)).await.unwrap();
        assert_eq!(user.email, "amina@school.test");

        let dup = service.create(input("amina@school.test", Role::Nurse)).await;
        assert!(matches!(dup, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_super_admin_role_rejected() {
        let service = service().await;
        let result = service.create(input("x@school.test", Role::SuperAdmin)).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let user = service.create(input("y@school.test", Role::Teacher)).await.unwrap();
        let result = service
            .update(user.id, UserUpdate { role: Some(Role::SuperAdmin), ..Default::default() })
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_password() {
        let service = service().await;
        let user = service.create(input("z@school.test", Role::Librarian)).await.unwrap();

        let updated = service
            .update(user.id, UserUpdate { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.role, Role::Librarian);

        assert!(matches!(service.set_password(user.id, "short").await, Err(ServiceError::Validation(_))));
        service.set_password(user.id, "new-shelf-code").await.unwrap();
        let stored = service.get(user.id).await.unwrap();
        assert!(verify_password("new-shelf-code", &stored.password_hash).unwrap());

        assert!(matches!(service.set_password(999, "whatever-long").await, Err(ServiceError::NotFound(_))));
    }
}
