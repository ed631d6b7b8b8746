//! Service wiring: picks store, blacklist and directory adapters from config.

use std::sync::Arc;

use thiserror::Error;

use netdesk_auth::memory::{InMemoryRoleStore, InMemoryTokenBlacklist, InMemoryUserStore};
use netdesk_auth::{
    AccountService, AuthService, AuthorizationGuard, BlacklistError, CredentialStore,
    LockoutPolicy, OrganizationDirectory, RoleEngine, RoleStore, TokenBlacklist, TokenLifetimes,
    TokenService, UserStore,
};
use netdesk_core::Clock;
use netdesk_infra::postgres::{self, PostgresOrganizationStore, PostgresRoleStore, PostgresUserStore, StoreError};
use netdesk_infra::{
    AppConfig, ConfigError, DirectoryError, Environment, HttpOrganizationDirectory,
    LocalOrganizationDirectory,
};
use netdesk_organizations::{InMemoryOrganizationStore, OrganizationService, OrganizationStore};

/// Everything the HTTP handlers and the CLI call into.
pub struct AppServices {
    pub auth: AuthService,
    pub accounts: AccountService,
    pub roles: Arc<RoleEngine>,
    pub organizations: OrganizationService,
    pub guard: Arc<AuthorizationGuard>,
    pub environment: Environment,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database: {0}")]
    Store(#[from] StoreError),

    #[error("token blacklist: {0}")]
    Blacklist(#[from] BlacklistError),

    #[error("organization directory: {0}")]
    Directory(#[from] DirectoryError),
}

struct Stores {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    organizations: Arc<dyn OrganizationStore>,
}

async fn stores(config: &AppConfig) -> Result<Stores, StartupError> {
    match &config.database_url {
        Some(url) => {
            let pool = postgres::connect(url, config.service_timeout).await?;
            postgres::ensure_schema(&pool).await?;
            tracing::info!("using postgres stores");
            Ok(Stores {
                users: Arc::new(PostgresUserStore::new(pool.clone())),
                roles: Arc::new(PostgresRoleStore::new(pool.clone())),
                organizations: Arc::new(PostgresOrganizationStore::new(pool)),
            })
        }
        None => {
            tracing::warn!("DATABASE_URL not set; data is kept in memory only");
            Ok(Stores {
                users: Arc::new(InMemoryUserStore::new()),
                roles: Arc::new(InMemoryRoleStore::new()),
                organizations: Arc::new(InMemoryOrganizationStore::new()),
            })
        }
    }
}

#[cfg(feature = "redis")]
async fn blacklist(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn TokenBlacklist>, StartupError> {
    match &config.redis_url {
        Some(url) => {
            let redis = netdesk_infra::redis::RedisTokenBlacklist::connect(url, clock).await?;
            tracing::info!("using redis token blacklist");
            Ok(Arc::new(redis))
        }
        None => Ok(Arc::new(InMemoryTokenBlacklist::new(clock))),
    }
}

#[cfg(not(feature = "redis"))]
async fn blacklist(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn TokenBlacklist>, StartupError> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL ignored: built without the redis feature");
    }
    Ok(Arc::new(InMemoryTokenBlacklist::new(clock)))
}

fn directory(
    config: &AppConfig,
    organizations: Arc<dyn OrganizationStore>,
) -> Result<Arc<dyn OrganizationDirectory>, StartupError> {
    Ok(match &config.org_service_url {
        Some(url) => {
            tracing::info!(%url, "using remote organization directory");
            Arc::new(HttpOrganizationDirectory::new(url.clone(), config.service_timeout)?)
        }
        None => Arc::new(LocalOrganizationDirectory::new(organizations)),
    })
}

fn chrono_duration(
    name: &'static str,
    value: std::time::Duration,
) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::from_std(value).map_err(|e| ConfigError::Invalid {
        name,
        value: format!("{value:?}"),
        reason: e.to_string(),
    })
}

/// Build the services for one process.
pub async fn build_services(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<AppServices, StartupError> {
    let lifetimes = TokenLifetimes {
        access: chrono_duration("ACCESS_TOKEN_LIFETIME_MINUTES", config.access_token_lifetime)?,
        refresh: chrono_duration("REFRESH_TOKEN_LIFETIME_DAYS", config.refresh_token_lifetime)?,
    };
    let lockout = LockoutPolicy {
        threshold: config.lockout_threshold,
        lock_for: chrono_duration("LOCKOUT_MINUTES", config.lockout_duration)?,
    };
    let remember_me_for = chrono_duration("REMEMBER_ME_DAYS", config.remember_me)?;

    let Stores {
        users,
        roles,
        organizations,
    } = stores(config).await?;
    let blacklist = blacklist(config, clock.clone()).await?;
    let directory = directory(config, organizations.clone())?;

    let tokens = Arc::new(TokenService::new(
        config.secret_key.as_bytes(),
        lifetimes,
        blacklist,
        clock.clone(),
    ));
    let engine = Arc::new(RoleEngine::new(
        roles,
        users.clone(),
        directory.clone(),
        clock.clone(),
    ));
    let credentials = CredentialStore::new(users.clone(), lockout, clock.clone());

    Ok(AppServices {
        auth: AuthService::new(
            credentials,
            tokens.clone(),
            engine.clone(),
            users.clone(),
            clock.clone(),
            remember_me_for,
        ),
        accounts: AccountService::new(
            users,
            engine.clone(),
            tokens.clone(),
            directory,
            clock.clone(),
            config.bcrypt_cost,
        ),
        roles: engine,
        organizations: OrganizationService::new(organizations, clock),
        guard: Arc::new(AuthorizationGuard::new(tokens, config.blacklist_fail_open)),
        environment: config.environment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdesk_core::ManualClock;

    fn config() -> AppConfig {
        AppConfig::from_lookup(|name| match name {
            "APP_ENV" => Some("development".to_string()),
            "BCRYPT_COST" => Some("4".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn builds_in_memory_services_without_urls() {
        let services = build_services(&config(), Arc::new(ManualClock::default()))
            .await
            .unwrap();
        assert_eq!(services.environment, Environment::Development);
        assert!(services
            .guard
            .resolve(None)
            .await
            .unwrap()
            .principal()
            .is_none());
    }
}
