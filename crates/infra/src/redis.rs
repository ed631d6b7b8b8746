//! Redis-backed token blacklist.
//!
//! Each revoked token id is a key that expires together with the token, so
//! the set never needs sweeping. `SET NX` makes insertion a single atomic
//! insert-if-absent, which is what refresh-token rotation relies on when two
//! requests race with the same refresh token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use uuid::Uuid;

use netdesk_auth::{BlacklistError, TokenBlacklist};
use netdesk_core::Clock;

const KEY_PREFIX: &str = "netdesk:blacklist:";

fn key(jti: Uuid) -> String {
    format!("{KEY_PREFIX}{jti}")
}

fn unavailable(err: redis::RedisError) -> BlacklistError {
    BlacklistError::Unavailable(err.to_string())
}

#[derive(Clone)]
pub struct RedisTokenBlacklist {
    connection: ConnectionManager,
    clock: Arc<dyn Clock>,
}

impl RedisTokenBlacklist {
    /// Connect eagerly; the manager reconnects on its own afterwards.
    pub async fn connect(redis_url: &str, clock: Arc<dyn Clock>) -> Result<Self, BlacklistError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let connection = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self { connection, clock })
    }
}

#[async_trait]
impl TokenBlacklist for RedisTokenBlacklist {
    #[tracing::instrument(skip(self))]
    async fn insert(&self, jti: Uuid, expires_at: DateTime<Utc>) -> Result<bool, BlacklistError> {
        let ttl = (expires_at - self.clock.now()).num_seconds().max(1);
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key(jti))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        // `OK` when set, nil when the key already existed.
        Ok(reply.is_some())
    }

    async fn contains(&self, jti: Uuid) -> Result<bool, BlacklistError> {
        let mut conn = self.connection.clone();
        let found: bool = redis::cmd("EXISTS")
            .arg(key(jti))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdesk_core::SystemClock;

    /// Runs only when `TEST_REDIS_URL` points at a scratch Redis.
    async fn blacklist() -> Option<RedisTokenBlacklist> {
        let url = std::env::var("TEST_REDIS_URL").ok()?;
        RedisTokenBlacklist::connect(&url, Arc::new(SystemClock)).await.ok()
    }

    #[tokio::test]
    async fn insert_is_first_writer_wins() {
        let Some(bl) = blacklist().await else { return };
        let jti = Uuid::now_v7();
        let exp = Utc::now() + chrono::Duration::minutes(5);

        assert!(!bl.contains(jti).await.unwrap());
        assert!(bl.insert(jti, exp).await.unwrap());
        assert!(!bl.insert(jti, exp).await.unwrap());
        assert!(bl.contains(jti).await.unwrap());
    }

    #[test]
    fn keys_are_namespaced() {
        let jti = Uuid::from_u128(1);
        assert_eq!(key(jti), format!("netdesk:blacklist:{jti}"));
    }
}
