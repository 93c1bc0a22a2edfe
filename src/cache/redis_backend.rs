//! Redis-compatible shared cache backend (feature `redis`).
//!
//! One multiplexed connection is opened lazily and shared by all callers. It is
//! dropped after an I/O failure or a timeout and re-established on the next
//! call. Every call, connecting included, runs under a deadline so a dead
//! Redis host turns into a fast error instead of a stalled request.
//!
//! Commands map one-to-one: `GET`, `SET EX`, `DEL`.

use super::backend::CacheBackend;
use crate::config::{AffinityConfig, DEFAULT_BACKEND_TIMEOUT_MS};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct RedisCache {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid redis URL: {}", e),
                ErrorContext::new().with_source("redis"),
            )
        })?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
        })
    }

    /// Client for `url` using `config.backend_timeout` as the per-call deadline.
    pub fn from_config(url: &str, config: &AffinityConfig) -> Result<Self> {
        Ok(Self::new(url)?.with_timeout(config.backend_timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(ref conn) = *guard {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| backend_error("connection failed", e))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        *self.connection.lock().await = None;
    }

    /// Run one command against the shared connection under the deadline.
    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let call = async {
            let conn = self.connection().await?;
            match command(conn).await {
                Ok(value) => Ok(value),
                Err(e) => {
                    if e.is_io_error() || e.is_connection_dropped() {
                        self.reset().await;
                    }
                    Err(backend_error(op, e))
                }
            }
        };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                self.reset().await;
                Err(Error::cache_with_context(
                    format!("{} timed out after {:?}", op, self.timeout),
                    ErrorContext::new().with_source("redis"),
                ))
            }
        }
    }
}

fn backend_error(op: &str, e: redis::RedisError) -> Error {
    Error::cache_with_context(
        format!("{}: {}", op, e),
        ErrorContext::new().with_source("redis"),
    )
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.run("GET", |mut conn| async move {
            conn.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let secs = ttl.as_secs().max(1);
        self.run("SET", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, secs).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .run("DEL", |mut conn| async move { conn.del::<_, u64>(key).await })
            .await?;
        Ok(removed > 0)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = RedisCache::new("not a url").err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_timeout_from_config() {
        let cfg = AffinityConfig::default().with_backend_timeout(Duration::from_millis(30));
        let cache = RedisCache::from_config("redis://127.0.0.1:6379", &cfg).unwrap();
        assert_eq!(cache.timeout(), Duration::from_millis(30));
        let cache = cache.with_timeout(Duration::ZERO);
        assert_eq!(cache.timeout(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_within_deadline() {
        // Port 1 on loopback is closed; the call must error, not hang.
        let cache = RedisCache::new("redis://127.0.0.1:1")
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        assert!(cache.get("affinity:k").await.is_err());
        assert!(cache.set("affinity:k", "1", Duration::from_secs(5)).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
