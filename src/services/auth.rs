//! Authentication service
//!
//! Login against either a school's user table (when a school code is given)
//! or the platform super-admin table, database-backed sessions, and the
//! start-up bootstrap of the first super-admin.

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use super::password::{hash_password, verify_password};
use super::rate_limiter::LoginRateLimiter;
use super::{optional, ServiceError, ServiceResult};
use crate::config::AuthConfig;
use crate::db::repositories::{
    SessionRepository, SqlxUserRepository, SuperAdminRepository, UserRepository,
};
use crate::models::{Claims, Role, Session};
use crate::tenancy::{normalize_code, TenancyError, TenantRouter};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub school_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub claims: Claims,
}

/// An authenticated principal before a session is opened for it
struct Principal {
    user_id: i64,
    name: String,
    email: String,
    role: Role,
}

pub struct AuthService {
    router: Arc<TenantRouter>,
    super_admins: Arc<dyn SuperAdminRepository>,
    sessions: Arc<dyn SessionRepository>,
    limiter: Arc<LoginRateLimiter>,
    session_days: i64,
}

impl AuthService {
    pub fn new(
        router: Arc<TenantRouter>,
        super_admins: Arc<dyn SuperAdminRepository>,
        sessions: Arc<dyn SessionRepository>,
        limiter: Arc<LoginRateLimiter>,
        session_days: i64,
    ) -> Self {
        Self {
            router,
            super_admins,
            sessions,
            limiter,
            session_days: session_days.max(1),
        }
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown accounts, wrong passwords and unknown or inactive schools all
    /// produce the same `Unauthorized` message.
    pub async fn login(&self, input: LoginInput, client_ip: Option<IpAddr>) -> ServiceResult<LoginOutcome> {
        if let Some(ip) = client_ip {
            if self.limiter.is_ip_limited(ip).await {
                return Err(ServiceError::RateLimited(
                    "Too many login requests, try again in a minute".to_string(),
                ));
            }
            self.limiter.record_ip_request(ip).await;
        }

        let email = input.email.trim().to_lowercase();
        let school_code = optional(&input.school_code).map(|c| normalize_code(&c));

        if self.limiter.is_account_limited(&email, school_code.as_deref()).await {
            return Err(ServiceError::RateLimited(
                "Too many failed login attempts, try again later".to_string(),
            ));
        }

        let principal = match &school_code {
            Some(code) => self.authenticate_tenant_user(code, &email, &input.password).await,
            None => self.authenticate_super_admin(&email, &input.password).await,
        };

        let principal = match principal {
            Ok(principal) => principal,
            Err(ServiceError::Unauthorized(message)) => {
                self.limiter.record_failure(&email, school_code.as_deref()).await;
                tracing::info!("Failed login for {} ({})", email, school_code.as_deref().unwrap_or("platform"));
                return Err(ServiceError::Unauthorized(message));
            }
            Err(other) => return Err(other),
        };

        self.limiter.clear_account(&email, school_code.as_deref()).await;

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: principal.user_id,
            school_code,
            role: principal.role,
            name: principal.name,
            email: principal.email,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };
        self.sessions.create(&session).await?;

        let claims = session.claims();
        Ok(LoginOutcome { session, claims })
    }

    async fn authenticate_tenant_user(
        &self,
        school_code: &str,
        email: &str,
        password: &str,
    ) -> ServiceResult<Principal> {
        let tenant = match self.router.resolve(school_code).await {
            Ok(tenant) => tenant,
            Err(TenancyError::UnknownSchool(_)) | Err(TenancyError::Inactive(_)) => {
                return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
            Err(TenancyError::Connect { code, message }) => {
                tracing::warn!("School {} database unavailable during login: {}", code, message);
                return Err(ServiceError::Unavailable(
                    "The school database is unavailable".to_string(),
                ));
            }
            Err(e) => return Err(ServiceError::Internal(e.into())),
        };

        let user = SqlxUserRepository::new(tenant.db)
            .get_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        if !user.is_active {
            return Err(ServiceError::Forbidden("This account has been deactivated".to_string()));
        }

        Ok(Principal {
            user_id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        })
    }

    async fn authenticate_super_admin(&self, email: &str, password: &str) -> ServiceResult<Principal> {
        let admin = self
            .super_admins
            .get_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &admin.password_hash)? {
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        if !admin.is_active {
            return Err(ServiceError::Forbidden("This account has been deactivated".to_string()));
        }

        Ok(Principal {
            user_id: admin.id,
            name: admin.name,
            email: admin.email,
            role: Role::SuperAdmin,
        })
    }

    /// Claims of a live session; expired sessions are deleted
    pub async fn validate_session(&self, token: &str) -> ServiceResult<Option<Claims>> {
        let session = match self.sessions.get_by_id(token).await? {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.sessions.delete(token).await?;
            return Ok(None);
        }

        Ok(Some(session.claims()))
    }

    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        self.sessions.delete(token).await?;
        Ok(())
    }

    /// End every session of one account
    pub async fn revoke_user_sessions(&self, school_code: Option<&str>, user_id: i64) -> ServiceResult<u64> {
        Ok(self.sessions.delete_by_user(school_code, user_id).await?)
    }

    pub async fn revoke_school_sessions(&self, school_code: &str) -> ServiceResult<u64> {
        Ok(self.sessions.delete_by_school(school_code).await?)
    }

    pub async fn cleanup_expired_sessions(&self) -> ServiceResult<u64> {
        let removed = self.sessions.delete_expired().await?;
        if removed > 0 {
            tracing::debug!("Removed {} expired sessions", removed);
        }
        self.limiter.cleanup().await;
        Ok(removed)
    }

    /// Create the first super-admin from configuration when none exists.
    /// Returns whether an account was created.
    pub async fn bootstrap(&self, config: &AuthConfig) -> ServiceResult<bool> {
        let (email, password) = match (&config.bootstrap_email, &config.bootstrap_password) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                (email.trim().to_lowercase(), password)
            }
            _ => return Ok(false),
        };

        if self.super_admins.count().await? > 0 {
            return Ok(false);
        }

        let name = optional(&config.bootstrap_name).unwrap_or_else(|| "Platform Administrator".to_string());
        let hash = hash_password(password)?;
        self.super_admins.create(&name, &email, &hash).await?;
        tracing::info!("Created bootstrap super-admin {}", email);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use crate::db::repositories::{
        NewUser, SchoolRecord, SchoolRepository, SqlxSchoolRepository, SqlxSessionRepository,
        SqlxSuperAdminRepository, UserUpdate,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    struct Fixture {
        auth: AuthService,
        router: Arc<TenantRouter>,
        sessions: Arc<dyn SessionRepository>,
        platform: DynDatabasePool,
    }

    async fn fixture() -> Fixture {
        let platform = create_test_pool().await.unwrap();
        migrations::run_migrations(&platform, migrations::PLATFORM_MIGRATIONS)
            .await
            .unwrap();

        SqlxSchoolRepository::new(platform.clone())
            .create(&SchoolRecord {
                code: "greenfield".to_string(),
                name: "Greenfield Academy".to_string(),
                database_url: "sqlite::memory:".to_string(),
                is_active: true,
            })
            .await
            .unwrap();

        let router = Arc::new(TenantRouter::new(platform.clone(), &TenancyConfig::default()));
        let tenant = router.resolve("greenfield").await.unwrap();
        SqlxUserRepository::new(tenant.db)
            .create(&NewUser {
                name: "Grace Bursar".to_string(),
                email: "bursar@greenfield.test".to_string(),
                password_hash: hash_password("ledger-2024").unwrap(),
                role: Role::Accountant,
            })
            .await
            .unwrap();

        let super_admins = SqlxSuperAdminRepository::boxed(platform.clone());
        super_admins
            .create("Root", "root@platform.test", &hash_password("platform-pass").unwrap())
            .await
            .unwrap();

        let sessions = SqlxSessionRepository::boxed(platform.clone());
        let auth = AuthService::new(
            router.clone(),
            super_admins,
            sessions.clone(),
            Arc::new(LoginRateLimiter::new()),
            7,
        );
        Fixture { auth, router, sessions, platform }
    }

    fn login(email: &str, password: &str, school: Option<&str>) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
            school_code: school.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_tenant_login_carries_school_claim() {
        let f = fixture().await;
        let outcome = f
            .auth
            .login(login("Bursar@Greenfield.test", "ledger-2024", Some(" GREENFIELD ")), None)
            .await
            .unwrap();
        assert_eq!(outcome.claims.role, Role::Accountant);
        assert_eq!(outcome.claims.school_code.as_deref(), Some("greenfield"));

        let claims = f.auth.validate_session(&outcome.session.id).await.unwrap();
        assert_eq!(claims, Some(outcome.claims));
    }

    #[tokio::test]
    async fn test_super_admin_login_has_no_school() {
        let f = fixture().await;
        let outcome = f
            .auth
            .login(login("root@platform.test", "platform-pass", None), None)
            .await
            .unwrap();
        assert!(outcome.claims.is_super_admin());
        assert!(outcome.claims.school_code.is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_share_one_message() {
        let f = fixture().await;
        let cases = [
            login("bursar@greenfield.test", "wrong", Some("greenfield")),
            login("nobody@greenfield.test", "ledger-2024", Some("greenfield")),
            login("bursar@greenfield.test", "ledger-2024", Some("atlantis")),
            login("bursar@greenfield.test", "ledger-2024", None),
        ];
        for case in cases {
            match f.auth.login(case, None).await {
                Err(ServiceError::Unauthorized(message)) => assert_eq!(message, INVALID_CREDENTIALS),
                other => panic!("expected unauthorized, got {:?}", other.map(|o| o.claims)),
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_school_database_is_unavailable() {
        let f = fixture().await;
        let blocker = tempfile::NamedTempFile::new().unwrap();
        SqlxSchoolRepository::new(f.platform.clone())
            .create(&SchoolRecord {
                code: "offline".to_string(),
                name: "Offline High".to_string(),
                database_url: format!("sqlite:{}/nested/school.db", blocker.path().display()),
                is_active: true,
            })
            .await
            .unwrap();

        let result = f
            .auth
            .login(login("head@offline.test", "whatever-1", Some("offline")), None)
            .await;
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_deactivated_user_is_forbidden() {
        let f = fixture().await;
        let tenant = f.router.resolve("greenfield").await.unwrap();
        let users = SqlxUserRepository::new(tenant.db);
        let user = users.get_by_email("bursar@greenfield.test").await.unwrap().unwrap();
        users
            .update(user.id, &UserUpdate { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();

        let result = f
            .auth
            .login(login("bursar@greenfield.test", "ledger-2024", Some("greenfield")), None)
            .await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_repeated_failures_are_rate_limited() {
        let f = fixture().await;
        for _ in 0..5 {
            let _ = f
                .auth
                .login(login("bursar@greenfield.test", "wrong", Some("greenfield")), None)
                .await;
        }
        let result = f
            .auth
            .login(login("bursar@greenfield.test", "ledger-2024", Some("greenfield")), None)
            .await;
        assert!(matches!(result, Err(ServiceError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let f = fixture().await;
        let now = Utc::now();
        let stale = Session {
            id: "stale-token".to_string(),
            user_id: 1,
            school_code: None,
            role: Role::SuperAdmin,
            name: "Root".to_string(),
            email: "root@platform.test".to_string(),
            expires_at: now - Duration::hours(1),
            created_at: now - Duration::days(8),
        };
        f.sessions.create(&stale).await.unwrap();

        assert!(f.auth.validate_session("stale-token").await.unwrap().is_none());
        assert!(f.sessions.get_by_id("stale-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout() {
        let f = fixture().await;
        let outcome = f
            .auth
            .login(login("root@platform.test", "platform-pass", None), None)
            .await
            .unwrap();
        f.auth.logout(&outcome.session.id).await.unwrap();
        assert!(f.auth.validate_session(&outcome.session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_only_when_empty() {
        let platform = create_test_pool().await.unwrap();
        migrations::run_migrations(&platform, migrations::PLATFORM_MIGRATIONS)
            .await
            .unwrap();
        let auth = AuthService::new(
            Arc::new(TenantRouter::new(platform.clone(), &TenancyConfig::default())),
            SqlxSuperAdminRepository::boxed(platform.clone()),
            SqlxSessionRepository::boxed(platform),
            Arc::new(LoginRateLimiter::new()),
            7,
        );

        let config = AuthConfig {
            bootstrap_email: Some("Owner@Platform.test".to_string()),
            bootstrap_password: Some("first-login".to_string()),
            ..AuthConfig::default()
        };
        assert!(auth.bootstrap(&config).await.unwrap());
        assert!(!auth.bootstrap(&config).await.unwrap());
        assert!(!auth.bootstrap(&AuthConfig::default()).await.unwrap());

        let outcome = auth
            .login(login("owner@platform.test", "first-login", None), None)
            .await
            .unwrap();
        assert_eq!(outcome.claims.name, "Platform Administrator");
    }
}
