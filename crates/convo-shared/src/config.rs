//! Configuration management

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_ACTIVE_DATA_TTL_SECS, DEFAULT_KEY_NAMESPACE, DEFAULT_MESSAGE_TTL_SECS,
    DEFAULT_OPERATION_TIMEOUT_MS, DEFAULT_POINTER_TTL_SECS, DEFAULT_WINDOW_SIZE,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cache: CacheConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub env: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub max_connections: usize,
}

/// Key layout, TTLs and window size for the conversation cache.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub key_namespace: String,
    pub message_ttl_seconds: u64,
    pub pointer_ttl_seconds: u64,
    pub active_data_ttl_seconds: u64,
    pub window_size: usize,
    pub verify_writes: bool,
    pub operation_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_namespace: DEFAULT_KEY_NAMESPACE.to_string(),
            message_ttl_seconds: DEFAULT_MESSAGE_TTL_SECS,
            pointer_ttl_seconds: DEFAULT_POINTER_TTL_SECS,
            active_data_ttl_seconds: DEFAULT_ACTIVE_DATA_TTL_SECS,
            window_size: DEFAULT_WINDOW_SIZE,
            verify_writes: true,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    /// `json` or `pretty`
    pub format: String,
    pub directory: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Config::builder()
            .set_default("app.env", "development")?
            .set_default("app.name", "convo")?
            .set_default("database.max_connections", 5)?
            .set_default("database.acquire_timeout_seconds", 3)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.max_connections", 16)?
            .set_default("cache.key_namespace", DEFAULT_KEY_NAMESPACE)?
            .set_default("cache.message_ttl_seconds", DEFAULT_MESSAGE_TTL_SECS as i64)?
            .set_default("cache.pointer_ttl_seconds", DEFAULT_POINTER_TTL_SECS as i64)?
            .set_default("cache.active_data_ttl_seconds", DEFAULT_ACTIVE_DATA_TTL_SECS as i64)?
            .set_default("cache.window_size", DEFAULT_WINDOW_SIZE as i64)?
            .set_default("cache.verify_writes", true)?
            .set_default("cache.operation_timeout_ms", DEFAULT_OPERATION_TIMEOUT_MS as i64)?
            .set_default("logging.format", "pretty")?
            .set_default("logging.directory", "logs")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::default().separator("__").try_parsing(true))
            .build()?;
        config.try_deserialize()
    }
}
