use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub auth_disabled: bool,
    pub approver_role: String,
    pub default_ou: String,
    pub email_domain: String,
    pub directory_url: Option<String>,
    pub directory_token: Option<String>,
    pub directory_timeout: Duration,
    pub directory_cache_ttl: Duration,
    pub directory_cache_capacity: u64,
    pub smtp: Option<SmtpSettings>,
    pub admin_email: Option<String>,
    pub notification_timeout: Duration,
    pub temp_password_length: usize,
    pub log_dir: PathBuf,
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

impl Config {
    /// Load environment variables and set defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let auth_disabled = optional("AUTH_DISABLED").is_some_and(|v| v == "true");
        let jwt_secret = match optional("JWT_SECRET") {
            Some(secret) => secret,
            None if auth_disabled => String::new(),
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: parsed("SMTP_PORT", 587u16)?,
                username: optional("SMTP_USERNAME"),
                password: optional("SMTP_PASSWORD"),
                from: optional("MAIL_FROM").ok_or(ConfigError::Missing("MAIL_FROM"))?,
            }),
            None => None,
        };

        let temp_password_length = parsed("TEMP_PASSWORD_LENGTH", 14usize)?;
        if temp_password_length < 8 {
            return Err(ConfigError::Invalid {
                key: "TEMP_PASSWORD_LENGTH",
                value: temp_password_length.to_string(),
            });
        }

        Ok(Self {
            database_url: optional("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10u32)?,
            bind_addr: parsed("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            jwt_secret,
            auth_disabled,
            approver_role: optional("APPROVER_ROLE").unwrap_or_else(|| "admin".to_string()),
            default_ou: optional("DEFAULT_OU")
                .unwrap_or_else(|| "CN=Users,DC=corp,DC=local".to_string()),
            email_domain: optional("EMAIL_DOMAIN").unwrap_or_else(|| "corp.local".to_string()),
            directory_url: optional("DIRECTORY_URL"),
            directory_token: optional("DIRECTORY_TOKEN"),
            directory_timeout: Duration::from_secs(parsed("DIRECTORY_TIMEOUT_SECS", 30u64)?),
            directory_cache_ttl: Duration::from_secs(parsed("DIRECTORY_CACHE_TTL_SECS", 300u64)?),
            directory_cache_capacity: parsed("DIRECTORY_CACHE_CAPACITY", 10_000u64)?,
            smtp,
            admin_email: optional("ADMIN_EMAIL"),
            notification_timeout: Duration::from_secs(parsed("NOTIFICATION_TIMEOUT_SECS", 10u64)?),
            temp_password_length,
            log_dir: PathBuf::from(optional("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
        })
    }

    /// Settings suitable for tests and local tooling; no external systems configured.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/approvals_test".to_string(),
            database_max_connections: 2,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: "test-secret".to_string(),
            auth_disabled: true,
            approver_role: "admin".to_string(),
            default_ou: "OU=Staff,DC=corp,DC=local".to_string(),
            email_domain: "corp.local".to_string(),
            directory_url: None,
            directory_token: None,
            directory_timeout: Duration::from_secs(5),
            directory_cache_ttl: Duration::from_secs(60),
            directory_cache_capacity: 100,
            smtp: None,
            admin_email: Some("helpdesk@corp.local".to_string()),
            notification_timeout: Duration::from_secs(5),
            temp_password_length: 14,
            log_dir: PathBuf::from("logs"),
        }
    }
}
