//! Redis-backed membership store.
//!
//! The membership set is a single Redis set (`SADD` / `SREM` / `SMEMBERS`)
//! shared by every relay process pointed at the same database.

use crate::config::StoreConfig;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use relay_core::store::{MembershipStore, Result, StoreError};
use relay_core::Member;
use std::time::Duration;
use tracing::{debug, info};

/// Membership store backed by a Redis set.
#[derive(Clone)]
pub struct RedisStore {
    /// Multiplexed connection; clones share it and it reconnects on its own
    conn: ConnectionManager,
    /// Key of the membership set
    set_key: String,
    /// Deadline for a single command
    timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a `PING`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = connection_url(config);
        let client = redis::Client::open(url.as_str()).map_err(map_redis_error)?;

        let conn = tokio::time::timeout(config.timeout(), client.get_connection_manager())
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "connecting to {} timed out after {:?}",
                    config.address,
                    config.timeout()
                ))
            })?
            .map_err(map_redis_error)?;

        let store = Self {
            conn,
            set_key: config.set_key.clone(),
            timeout: config.timeout(),
        };
        store.ping().await?;

        info!(
            "Connected to Redis at {} (db {}, set {})",
            config.address, config.db, config.set_key
        );
        Ok(store)
    }

    /// Run a command under the store deadline.
    async fn run<T, F>(&self, operation: &'static str, command: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, command).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(StoreError::Unavailable(format!(
                "{} timed out after {:?}",
                operation, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl MembershipStore for RedisStore {
    async fn add_member(&self, member: &Member) -> Result<()> {
        let mut conn = self.conn.clone();
        let added: i64 = self
            .run("SADD", conn.sadd(&self.set_key, member.as_str()))
            .await?;
        debug!("SADD {} {} -> {}", self.set_key, member, added);
        Ok(())
    }

    async fn remove_member(&self, member: &Member) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .run("SREM", conn.srem(&self.set_key, member.as_str()))
            .await?;
        debug!("SREM {} {} -> {}", self.set_key, member, removed);
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = self
            .run("SMEMBERS", conn.smembers(&self.set_key))
            .await?;
        Ok(members.into_iter().map(Member::new).collect())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let ping = redis::cmd("PING");
        let _pong: String = self.run("PING", ping.query_async(&mut conn)).await?;
        Ok(())
    }
}

/// Build `redis://[:password@]host:port/db` from the store config.
pub fn connection_url(config: &StoreConfig) -> String {
    match config.password.as_deref() {
        Some(password) if !password.is_empty() => format!(
            "redis://:{}@{}/{}",
            urlencoding::encode(password),
            config.address,
            config.db
        ),
        _ => format!("redis://{}/{}", config.address, config.db),
    }
}

fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Rejected(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_without_password() {
        let config = StoreConfig::default();
        assert_eq!(connection_url(&config), "redis://localhost:6379/0");
    }

    #[test]
    fn test_connection_url_with_password_and_db() {
        let config = StoreConfig {
            address: "cache.internal:6380".to_string(),
            password: Some("p@ss:word/1".to_string()),
            db: 2,
            ..StoreConfig::default()
        };
        assert_eq!(
            connection_url(&config),
            "redis://:p%40ss%3Aword%2F1@cache.internal:6380/2"
        );
    }

    #[test]
    fn test_empty_password_means_no_auth() {
        let config = StoreConfig {
            password: Some(String::new()),
            ..StoreConfig::default()
        };
        assert_eq!(connection_url(&config), "redis://localhost:6379/0");
    }

    #[test]
    fn test_connection_url_is_accepted_by_client() {
        let config = StoreConfig {
            password: Some("secret".to_string()),
            db: 1,
            ..StoreConfig::default()
        };
        assert!(redis::Client::open(connection_url(&config).as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_unavailable() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = StoreConfig {
            address: addr.to_string(),
            timeout_secs: 2,
            ..StoreConfig::default()
        };
        match RedisStore::connect(&config).await {
            Err(StoreError::Unavailable(_)) => {}
            Err(other) => panic!("Expected Unavailable, got {:?}", other),
            Ok(_) => panic!("Expected connection failure"),
        }
    }
}
