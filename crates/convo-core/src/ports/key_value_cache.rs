//! Key-value cache port

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ConversationError;

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Connectivity check issued before must-succeed writes.
    async fn ping(&self) -> Result<(), ConversationError>;

    async fn get(&self, key: &str) -> Result<Option<String>, ConversationError>;

    /// `ttl = None` stores the value without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ConversationError>;

    /// Remove all `keys` in one round trip. Missing keys are not an error.
    async fn delete(&self, keys: &[&str]) -> Result<(), ConversationError>;
}
