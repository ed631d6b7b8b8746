//! Process configuration, read once from the environment at start-up.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

const DEV_SECRET_KEY: &str = "netdesk-insecure-development-key";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: Environment,
    pub secret_key: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub remember_me: Duration,
    pub lockout_threshold: u32,
    pub lockout_duration: Duration,
    /// Remote organization service; `None` uses the in-process registry.
    pub org_service_url: Option<String>,
    pub service_timeout: Duration,
    /// `None` keeps every store in memory.
    pub database_url: Option<String>,
    /// `None` keeps the token blacklist in memory.
    pub redis_url: Option<String>,
    pub blacklist_fail_open: bool,
    pub bind_addr: SocketAddr,
    pub bcrypt_cost: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let environment = match get("APP_ENV").as_deref().map(str::trim) {
            None | Some("production") => Environment::Production,
            Some("development") => Environment::Development,
            Some(other) => {
                return Err(invalid("APP_ENV", other, "expected development or production"));
            }
        };

        let secret_key = match get("SECRET_KEY") {
            Some(key) => key,
            None if environment.is_development() => {
                tracing::warn!("SECRET_KEY not set; using the insecure development key");
                DEV_SECRET_KEY.to_string()
            }
            None => return Err(ConfigError::Missing("SECRET_KEY")),
        };

        let access_minutes = number(&get, "ACCESS_TOKEN_LIFETIME_MINUTES", 240u64)?;
        let refresh_days = number(&get, "REFRESH_TOKEN_LIFETIME_DAYS", 7u64)?;
        let remember_days = number(&get, "REMEMBER_ME_DAYS", 30u64)?;
        let lockout_threshold = number(&get, "LOCKOUT_THRESHOLD", 5u32)?;
        let lockout_minutes = number(&get, "LOCKOUT_MINUTES", 30u64)?;
        let timeout_secs = number(&get, "SERVICE_TIMEOUT_SECS", 5u64)?;
        let bcrypt_cost = number(&get, "BCRYPT_COST", 12u32)?;

        for (name, value) in [
            ("ACCESS_TOKEN_LIFETIME_MINUTES", access_minutes),
            ("REFRESH_TOKEN_LIFETIME_DAYS", refresh_days),
            ("REMEMBER_ME_DAYS", remember_days),
            ("LOCKOUT_MINUTES", lockout_minutes),
        ] {
            if value == 0 {
                return Err(invalid(name, "0", "must be positive"));
            }
        }
        if lockout_threshold == 0 {
            return Err(invalid("LOCKOUT_THRESHOLD", "0", "must be positive"));
        }
        if !(1..=9).contains(&timeout_secs) {
            return Err(invalid(
                "SERVICE_TIMEOUT_SECS",
                &timeout_secs.to_string(),
                "must be between 1 and 9 seconds",
            ));
        }
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(invalid("BCRYPT_COST", &bcrypt_cost.to_string(), "must be between 4 and 31"));
        }

        let blacklist_fail_open = match get("BLACKLIST_FAIL_OPEN").as_deref().map(str::trim) {
            None => false,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => return Err(invalid("BLACKLIST_FAIL_OPEN", other, "expected true or false")),
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e: std::net::AddrParseError| invalid("BIND_ADDR", &bind_raw, &e.to_string()))?;

        let org_service_url = get("ORG_SERVICE_URL").map(|url| url.trim().trim_end_matches('/').to_string());
        if let Some(url) = &org_service_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid("ORG_SERVICE_URL", url, "expected an http(s) URL"));
            }
        }

        Ok(Self {
            environment,
            secret_key,
            access_token_lifetime: Duration::from_secs(access_minutes * 60),
            refresh_token_lifetime: Duration::from_secs(refresh_days * 86_400),
            remember_me: Duration::from_secs(remember_days * 86_400),
            lockout_threshold,
            lockout_duration: Duration::from_secs(lockout_minutes * 60),
            org_service_url,
            service_timeout: Duration::from_secs(timeout_secs),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            blacklist_fail_open,
            bind_addr,
            bcrypt_cost,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn number<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(name, &raw, &e.to_string())),
    }
}
