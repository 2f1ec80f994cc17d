// ============================================================================
// Convo Infrastructure - Redis Key-Value Cache
// File: crates/convo-infrastructure/src/cache/redis_cache.rs
// ============================================================================

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Connection, CreatePoolError, Pool, PoolConfig, Runtime};
use std::time::Duration;
use tracing::{debug, error};

use convo_core::error::ConversationError;
use convo_core::ports::KeyValueCache;

pub fn create_redis_pool(url: &str, max_connections: usize) -> Result<Pool, CreatePoolError> {
    let mut cfg = Config::from_url(url);
    cfg.pool = Some(PoolConfig::new(max_connections));
    cfg.create_pool(Some(Runtime::Tokio1))
}

/// Redis-backed implementation of the key-value cache port.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<Connection, ConversationError> {
        self.pool.get().await.map_err(|e| {
            error!("Failed to get Redis connection: {}", e);
            ConversationError::CacheUnavailable(e.to_string())
        })
    }
}

fn unavailable(op: &str, key: &str, e: redis::RedisError) -> ConversationError {
    error!("Redis {} failed for {}: {}", op, key, e);
    ConversationError::CacheUnavailable(e.to_string())
}

/// Redis rejects a zero expiry, so anything below one millisecond rounds up.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn ping(&self) -> Result<(), ConversationError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| unavailable("PING", "-", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ConversationError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| unavailable("GET", key, e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ConversationError> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => conn
                .pset_ex::<_, _, ()>(key, value, expiry_millis(ttl))
                .await
                .map_err(|e| unavailable("PSETEX", key, e))?,
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| unavailable("SET", key, e))?,
        }
        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), ConversationError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| unavailable("DEL", &keys.join(","), e))?;
        debug!("Deleted {:?}", keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_millis() {
        assert_eq!(expiry_millis(Duration::from_secs(86_400)), 86_400_000);
        assert_eq!(expiry_millis(Duration::from_micros(10)), 1);
        assert_eq!(expiry_millis(Duration::ZERO), 1);
    }
}
