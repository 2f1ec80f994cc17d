//! Cache settings injected into every service

use std::time::Duration;

use convo_shared::CacheConfig;

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub key_namespace: String,
    /// Default per-message lifetime.
    pub message_ttl: Duration,
    pub pointer_ttl: Duration,
    pub active_data_ttl: Duration,
    /// Bounded cache window (most recent N messages).
    pub window_size: usize,
    /// Re-read and parse after every snapshot write.
    pub verify_writes: bool,
}

impl CacheSettings {
    pub fn message_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.message_ttl).unwrap_or_else(|_| chrono::Duration::hours(24))
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(cfg: &CacheConfig) -> Self {
        Self {
            key_namespace: cfg.key_namespace.clone(),
            message_ttl: Duration::from_secs(cfg.message_ttl_seconds),
            pointer_ttl: Duration::from_secs(cfg.pointer_ttl_seconds),
            active_data_ttl: Duration::from_secs(cfg.active_data_ttl_seconds),
            window_size: cfg.window_size,
            verify_writes: cfg.verify_writes,
        }
    }
}
