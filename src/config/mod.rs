use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub pagination: PaginationConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string. When absent the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
    pub jwt_leeway_secs: u64,
    pub jwt_expiry_hours: u64,
    pub cors_origins: Vec<String>,
    /// Believe `X-Forwarded-For`/`X-Real-IP` for audit IPs. Only set behind a
    /// proxy that overwrites them.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

// Keep the signing secret out of logs and `adminctl config` output.
impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .field("jwt_expiry_hours", &self.jwt_expiry_hours)
            .field("cors_origins", &self.cors_origins)
            .field("trust_proxy_headers", &self.trust_proxy_headers)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Upper bound on how long a request waits for its audit append.
    pub write_timeout_ms: u64,
}

impl Environment {
    /// Parse an `APP_ENV` value. Unset or blank means development; anything
    /// unrecognised is an error rather than a silent fallback.
    pub fn from_name(name: Option<&str>) -> Result<Self, ConfigError> {
        let name = name.map(str::trim).unwrap_or_default();
        match name.to_ascii_lowercase().as_str() {
            "" | "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::UnknownEnvironment(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),

    #[error("unrecognised APP_ENV '{0}' (expected development, staging or production)")]
    UnknownEnvironment(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Pick up a local .env before reading anything else
        let _ = dotenvy::dotenv();

        let environment = Environment::from_name(env::var("APP_ENV").ok().as_deref())?;

        // Set defaults based on environment, then override with specific env vars
        Ok(match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("ADMIN_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|v| v.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("SERVER_MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = v.parse().unwrap_or(self.server.max_request_size_bytes);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout_secs = v.parse().unwrap_or(self.database.connect_timeout_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ISSUER") {
            self.security.jwt_issuer = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("JWT_AUDIENCE") {
            self.security.jwt_audience = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("JWT_LEEWAY_SECS") {
            self.security.jwt_leeway_secs = v.parse().unwrap_or(self.security.jwt_leeway_secs);
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env::var("TRUST_PROXY_HEADERS") {
            self.security.trust_proxy_headers = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        // Pagination overrides
        if let Ok(v) = env::var("PAGINATION_DEFAULT_LIMIT") {
            self.pagination.default_limit = v.parse().unwrap_or(self.pagination.default_limit);
        }
        if let Ok(v) = env::var("PAGINATION_MAX_LIMIT") {
            self.pagination.max_limit = v.parse().unwrap_or(self.pagination.max_limit);
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_WRITE_TIMEOUT_MS") {
            self.audit.write_timeout_ms = v.parse().unwrap_or(self.audit.write_timeout_ms);
        }

        self
    }

    /// Reject configurations the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if let Some(database_url) = &self.database.url {
            url::Url::parse(database_url).map_err(|_| ConfigError::Invalid("DATABASE_URL"))?;
        }
        if self.pagination.default_limit == 0 || self.pagination.max_limit == 0 {
            return Err(ConfigError::Invalid("PAGINATION_DEFAULT_LIMIT/PAGINATION_MAX_LIMIT"));
        }
        if self.audit.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("AUDIT_WRITE_TIMEOUT_MS"));
        }
        Ok(())
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                max_request_size_bytes: 1024 * 1024, // 1MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connect_timeout_secs: 30,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_issuer: None,
                jwt_audience: None,
                jwt_leeway_secs: 60,
                jwt_expiry_hours: 24 * 7, // 1 week
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                trust_proxy_headers: false,
            },
            pagination: PaginationConfig {
                default_limit: 20,
                max_limit: 500,
            },
            audit: AuditConfig {
                write_timeout_ms: 5_000,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                max_request_size_bytes: 512 * 1024,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connect_timeout_secs: 10,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_issuer: None,
                jwt_audience: None,
                jwt_leeway_secs: 30,
                jwt_expiry_hours: 24,
                cors_origins: vec!["https://admin.staging.example.com".to_string()],
                trust_proxy_headers: false,
            },
            pagination: PaginationConfig {
                default_limit: 20,
                max_limit: 200,
            },
            audit: AuditConfig {
                write_timeout_ms: 3_000,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 3000,
                max_request_size_bytes: 256 * 1024,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connect_timeout_secs: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_issuer: None,
                jwt_audience: None,
                jwt_leeway_secs: 30,
                jwt_expiry_hours: 4,
                cors_origins: vec!["https://admin.example.com".to_string()],
                trust_proxy_headers: false,
            },
            pagination: PaginationConfig {
                default_limit: 20,
                max_limit: 100,
            },
            audit: AuditConfig {
                write_timeout_ms: 2_000,
            },
        }
    }

    /// Configuration used by unit and integration tests: in-memory store, fixed secret.
    pub fn for_tests(secret: &str) -> Self {
        let mut config = Self::development();
        config.security.jwt_secret = secret.to_string();
        config
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<Result<AppConfig, ConfigError>> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> Result<&'static AppConfig, ConfigError> {
    CONFIG.as_ref().map_err(ConfigError::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.database.url.is_none());
        assert_eq!(config.pagination.default_limit, 20);
        assert!(AppConfig::for_tests("secret").validate().is_ok());
    }

    #[test]
    fn test_no_preset_carries_a_secret() {
        for config in [AppConfig::development(), AppConfig::staging(), AppConfig::production()] {
            assert!(config.security.jwt_secret.is_empty());
            assert!(matches!(config.validate(), Err(ConfigError::Missing("JWT_SECRET"))));
        }
    }

    #[test]
    fn test_environment_names() {
        assert_eq!(Environment::from_name(None).unwrap(), Environment::Development);
        assert_eq!(Environment::from_name(Some("")).unwrap(), Environment::Development);
        assert_eq!(Environment::from_name(Some("Production")).unwrap(), Environment::Production);
        assert_eq!(Environment::from_name(Some("stage")).unwrap(), Environment::Staging);

        for name in ["prd", "live", "productoin"] {
            assert!(matches!(
                Environment::from_name(Some(name)),
                Err(ConfigError::UnknownEnvironment(_))
            ));
        }
    }

    #[test]
    fn test_default_production_config_requires_secret() {
        let config = AppConfig::production();
        assert_eq!(config.pagination.max_limit, 100);
        assert!(matches!(config.validate(), Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn test_invalid_database_url_rejected() {
        let mut config = AppConfig::for_tests("secret");
        config.database.url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid("DATABASE_URL"))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AppConfig::for_tests("super-secret-value");
        let rendered = format!("{:?}", config.security);
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
