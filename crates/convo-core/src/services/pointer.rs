//! Active-conversation pointer: `user:<id>:active_conversation_id`.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::ConversationError;
use crate::keys::CacheKeys;
use crate::ports::KeyValueCache;
use crate::settings::CacheSettings;

/// Owns the pointer key and the bounded-cache invalidation tied to it.
#[derive(Clone)]
pub struct ActivePointer {
    cache: Arc<dyn KeyValueCache>,
    keys: CacheKeys,
    ttl: Duration,
}

impl ActivePointer {
    pub fn new(cache: Arc<dyn KeyValueCache>, settings: &CacheSettings) -> Self {
        Self {
            cache,
            keys: CacheKeys::new(settings.key_namespace.clone()),
            ttl: settings.pointer_ttl,
        }
    }

    /// Currently active conversation id, `None` when unset.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<Option<String>, ConversationError> {
        let key = self.keys.pointer(user_id);
        let value = ctx.run("get active pointer", self.cache.get(&key)).await?;
        Ok(value.filter(|id| !id.trim().is_empty()))
    }

    /// Point at `conversation_id` with a fresh TTL, then drop the bounded
    /// cache since it belongs to the previous conversation.
    pub async fn set(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), ConversationError> {
        let key = self.keys.pointer(user_id);
        ctx.ensure_active("set active pointer")?;
        ctx.run(
            "set active pointer",
            self.cache.set(&key, conversation_id, Some(self.ttl)),
        )
        .await?;
        info!("User {} active conversation -> {}", user_id, conversation_id);

        self.invalidate_data(ctx, user_id).await
    }

    /// Drop the bounded cache entry. Deleting an absent entry is not an error.
    pub async fn invalidate_data(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<(), ConversationError> {
        let key = self.keys.active_data(user_id);
        ctx.ensure_active("invalidate active data")?;
        ctx.run("invalidate active data", self.cache.delete(&[key.as_str()]))
            .await?;
        debug!("Invalidated active conversation cache for user {}", user_id);
        Ok(())
    }

    /// Best-effort variant of [`invalidate_data`](Self::invalidate_data).
    pub async fn invalidate_data_quietly(&self, ctx: &RequestContext, user_id: &str) {
        if let Err(e) = self.invalidate_data(ctx, user_id).await {
            warn!(
                "Failed to invalidate active conversation cache for user {}: {}",
                user_id, e
            );
        }
    }

    /// Called when `conversation_id` is modified elsewhere. Drops the bounded
    /// cache if that conversation is the active one, or unconditionally when
    /// the pointer cannot be read. Returns whether the cache was dropped.
    pub async fn invalidate_for_conversation(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<bool, ConversationError> {
        match self.get(ctx, user_id).await {
            Ok(Some(active)) if active == conversation_id => {
                self.invalidate_data(ctx, user_id).await?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) => {
                warn!(
                    "Cannot read active pointer for user {} ({}), dropping active cache",
                    user_id, e
                );
                self.invalidate_data(ctx, user_id).await?;
                Ok(true)
            }
        }
    }
}
