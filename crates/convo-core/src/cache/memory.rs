use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::ConversationError;
use crate::ports::KeyValueCache;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process key-value cache with per-key TTL.
/// Uses DashMap for lock-free concurrent access; expiry is lazy, on read.
#[derive(Clone)]
pub struct InMemoryCache {
    storage: Arc<DashMap<String, Entry>>,

    /// When false every call fails with `CacheUnavailable`
    available: Arc<AtomicBool>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate losing (or regaining) the connection to the cache.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        match self.storage.get(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    /// Remaining lifetime of `key`, `None` if absent or stored without TTL.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.storage.get(key)?;
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    fn check_available(&self) -> Result<(), ConversationError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConversationError::CacheUnavailable(
                "in-memory cache marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn ping(&self) -> Result<(), ConversationError> {
        self.check_available()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ConversationError> {
        self.check_available()?;

        match self.storage.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // Re-checked under the shard lock so a concurrent set is not removed.
        if self.storage.remove_if(key, |_, entry| entry.is_expired()).is_some() {
            debug!("Key {} expired, removed from cache", key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ConversationError> {
        self.check_available()?;
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.storage.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), ConversationError> {
        self.check_available()?;
        for key in keys {
            self.storage.remove(*key);
        }
        Ok(())
    }
}
