//! Configuration management
//!
//! Configuration is read from `config.yml` and may be overridden through
//! `SCHOLARIS_*` environment variables. Every field has a default, so a
//! missing or empty file yields a runnable configuration.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Platform registry database (schools, super-admins, sessions)
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Tenant connection cache configuration
    #[serde(default)]
    pub tenancy: TenancyConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Value cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/platform.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Tenant connection cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Maximum number of tenant pools kept open at once
    #[serde(default = "default_max_tenants")]
    pub max_tenants: u64,
    /// Seconds a tenant pool may stay unused before it is closed
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: u64,
    /// Connection limit of each tenant pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            max_tenants: default_max_tenants(),
            idle_seconds: default_idle_seconds(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_tenants() -> u64 {
    256
}

fn default_idle_seconds() -> u64 {
    1800
}

fn default_max_connections() -> u32 {
    10
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Super-admin created at startup when none exists
    #[serde(default)]
    pub bootstrap_email: Option<String>,
    #[serde(default)]
    pub bootstrap_password: Option<String>,
    #[serde(default)]
    pub bootstrap_name: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            bootstrap_email: None,
            bootstrap_password: None,
            bootstrap_name: None,
        }
    }
}

fn default_session_days() -> i64 {
    7
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the defaults. Invalid YAML is an error
    /// carrying the line and column of the problem.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file, then apply `SCHOLARIS_*` overrides.
    ///
    /// Recognised variables: `SCHOLARIS_SERVER_HOST`, `SCHOLARIS_SERVER_PORT`,
    /// `SCHOLARIS_SERVER_CORS_ORIGIN`, `SCHOLARIS_DATABASE_DRIVER`,
    /// `SCHOLARIS_DATABASE_URL`, `SCHOLARIS_TENANCY_MAX_TENANTS`,
    /// `SCHOLARIS_TENANCY_IDLE_SECONDS`, `SCHOLARIS_TENANCY_MAX_CONNECTIONS`,
    /// `SCHOLARIS_AUTH_SESSION_DAYS`, `SCHOLARIS_AUTH_BOOTSTRAP_EMAIL`,
    /// `SCHOLARIS_AUTH_BOOTSTRAP_PASSWORD`, `SCHOLARIS_AUTH_BOOTSTRAP_NAME`,
    /// `SCHOLARIS_CACHE_TTL_SECONDS`.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SCHOLARIS_SERVER_HOST") {
            self.server.host = host;
        }
        override_parsed("SCHOLARIS_SERVER_PORT", &mut self.server.port);
        if let Ok(cors_origin) = std::env::var("SCHOLARIS_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("SCHOLARIS_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("SCHOLARIS_DATABASE_URL") {
            self.database.url = url;
        }

        override_parsed("SCHOLARIS_TENANCY_MAX_TENANTS", &mut self.tenancy.max_tenants);
        override_parsed("SCHOLARIS_TENANCY_IDLE_SECONDS", &mut self.tenancy.idle_seconds);
        override_parsed(
            "SCHOLARIS_TENANCY_MAX_CONNECTIONS",
            &mut self.tenancy.max_connections,
        );

        override_parsed("SCHOLARIS_AUTH_SESSION_DAYS", &mut self.auth.session_days);
        if let Ok(email) = std::env::var("SCHOLARIS_AUTH_BOOTSTRAP_EMAIL") {
            self.auth.bootstrap_email = Some(email);
        }
        if let Ok(password) = std::env::var("SCHOLARIS_AUTH_BOOTSTRAP_PASSWORD") {
            self.auth.bootstrap_password = Some(password);
        }
        if let Ok(name) = std::env::var("SCHOLARIS_AUTH_BOOTSTRAP_NAME") {
            self.auth.bootstrap_name = Some(name);
        }

        override_parsed("SCHOLARIS_CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds);
    }
}

/// Overwrite `target` when the variable is set and parses; otherwise keep it.
fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        if let Ok(value) = raw.parse::<T>() {
            *target = value;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_scholaris_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/platform.db");
        assert_eq!(config.tenancy.max_tenants, 256);
        assert_eq!(config.auth.session_days, 7);
        assert!(config.auth.bootstrap_email.is_none());
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.cache.ttl_seconds, 300);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "tenancy:\n  max_tenants: 12\nserver:\n  port: 9000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.tenancy.max_tenants, 12);
        assert_eq!(config.tenancy.idle_seconds, 1800);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: 127.0.0.1
  port: 3001
  cors_origin: https://portal.example.org
database:
  driver: mysql
  url: mysql://root@localhost/platform
tenancy:
  max_tenants: 40
  idle_seconds: 60
  max_connections: 4
auth:
  session_days: 2
  bootstrap_email: root@example.org
  bootstrap_password: changeme123
cache:
  ttl_seconds: 30
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert_eq!(config.tenancy.max_connections, 4);
        assert_eq!(config.auth.session_days, 2);
        assert_eq!(config.auth.bootstrap_email.as_deref(), Some("root@example.org"));
        assert_eq!(config.cache.ttl_seconds, 30);
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: [not a port").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_env_overrides() {
        let _guard = lock_env();
        std::env::set_var("SCHOLARIS_SERVER_PORT", "7070");
        std::env::set_var("SCHOLARIS_DATABASE_DRIVER", "MySQL");
        std::env::set_var("SCHOLARIS_TENANCY_IDLE_SECONDS", "15");
        std::env::set_var("SCHOLARIS_AUTH_BOOTSTRAP_EMAIL", "ops@example.org");

        let config = Config::load_with_env(std::path::Path::new("missing.yml")).unwrap();

        std::env::remove_var("SCHOLARIS_SERVER_PORT");
        std::env::remove_var("SCHOLARIS_DATABASE_DRIVER");
        std::env::remove_var("SCHOLARIS_TENANCY_IDLE_SECONDS");
        std::env::remove_var("SCHOLARIS_AUTH_BOOTSTRAP_EMAIL");

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert_eq!(config.tenancy.idle_seconds, 15);
        assert_eq!(config.auth.bootstrap_email.as_deref(), Some("ops@example.org"));
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();
        std::env::set_var("SCHOLARIS_SERVER_PORT", "not-a-port");
        std::env::set_var("SCHOLARIS_DATABASE_DRIVER", "postgres");
        std::env::set_var("SCHOLARIS_TENANCY_MAX_TENANTS", "-3");

        let config = Config::load_with_env(std::path::Path::new("missing.yml")).unwrap();

        std::env::remove_var("SCHOLARIS_SERVER_PORT");
        std::env::remove_var("SCHOLARIS_DATABASE_DRIVER");
        std::env::remove_var("SCHOLARIS_TENANCY_MAX_TENANTS");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.tenancy.max_tenants, 256);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn config_strategy() -> impl Strategy<Value = Config> {
            (
                "[a-z]{1,12}(\\.[a-z]{1,8}){0,2}",
                1024u16..65535,
                prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
                "data/[a-z]{1,10}\\.db",
                1u64..10_000,
                1u64..100_000,
                1u32..100,
                1i64..90,
            )
                .prop_map(
                    |(host, port, driver, url, max_tenants, idle_seconds, max_connections, days)| {
                        Config {
                            server: ServerConfig {
                                host,
                                port,
                                cors_origin: default_cors_origin(),
                            },
                            database: DatabaseConfig { driver, url },
                            tenancy: TenancyConfig {
                                max_tenants,
                                idle_seconds,
                                max_connections,
                            },
                            auth: AuthConfig {
                                session_days: days,
                                ..AuthConfig::default()
                            },
                            cache: CacheConfig::default(),
                        }
                    },
                )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            /// Serialising a configuration to YAML and loading it back preserves it.
            #[test]
            fn config_yaml_roundtrip(config in config_strategy()) {
                let yaml = serde_yaml::to_string(&config).unwrap();
                let mut file = NamedTempFile::new().unwrap();
                file.write_all(yaml.as_bytes()).unwrap();

                let loaded = Config::load(file.path()).unwrap();
                prop_assert_eq!(loaded.server.host, config.server.host);
                prop_assert_eq!(loaded.server.port, config.server.port);
                prop_assert_eq!(loaded.database.driver, config.database.driver);
                prop_assert_eq!(loaded.database.url, config.database.url);
                prop_assert_eq!(loaded.tenancy.max_tenants, config.tenancy.max_tenants);
                prop_assert_eq!(loaded.tenancy.idle_seconds, config.tenancy.idle_seconds);
                prop_assert_eq!(loaded.tenancy.max_connections, config.tenancy.max_connections);
                prop_assert_eq!(loaded.auth.session_days, config.auth.session_days);
            }

            /// A numeric environment override always wins over the file value.
            #[test]
            fn env_port_overrides_file(file_port in 1024u16..30000, env_port in 30000u16..65535) {
                let _guard = lock_env();
                let mut file = NamedTempFile::new().unwrap();
                writeln!(file, "server:\n  port: {}", file_port).unwrap();

                std::env::set_var("SCHOLARIS_SERVER_PORT", env_port.to_string());
                let config = Config::load_with_env(file.path()).unwrap();
                std::env::remove_var("SCHOLARIS_SERVER_PORT");

                prop_assert_eq!(config.server.port, env_port);
            }
        }
    }
}
