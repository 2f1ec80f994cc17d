// ============================================================================
// Convo Core - Conversation History
// File: crates/convo-core/src/services/history.rs
// ============================================================================
//! Unbounded per-user snapshot stored as one JSON value under
//! `user:<id>:conversation`. Expiry is per message; the key itself has no TTL.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::RequestContext;
use crate::domain::{ChatMessage, ConversationSnapshot, MessageCompletion};
use crate::error::ConversationError;
use crate::keys::CacheKeys;
use crate::ports::KeyValueCache;
use crate::settings::CacheSettings;

/// Snapshot read/modify/write against the key-value cache.
///
/// Concurrent writers for the same user are not serialized: two interleaved
/// read-modify-write cycles end with the last write winning.
#[derive(Clone)]
pub struct ConversationHistory {
    cache: Arc<dyn KeyValueCache>,
    keys: CacheKeys,
    settings: CacheSettings,
}

impl ConversationHistory {
    pub fn new(cache: Arc<dyn KeyValueCache>, settings: CacheSettings) -> Self {
        Self {
            cache,
            keys: CacheKeys::new(settings.key_namespace.clone()),
            settings,
        }
    }

    /// Load the snapshot, dropping expired messages.
    ///
    /// When anything was dropped the filtered result is written back, or the
    /// key deleted if nothing survived. A payload that does not decode is a
    /// hard error and the entry is left in place.
    pub async fn load(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<ConversationSnapshot, ConversationError> {
        let key = self.keys.snapshot(user_id);
        let now = Utc::now();

        let raw = ctx.run("load snapshot", self.cache.get(&key)).await?;
        let Some(raw) = raw else {
            debug!("No snapshot for user {}", user_id);
            return Ok(ConversationSnapshot::empty(now));
        };

        let mut snapshot: ConversationSnapshot = serde_json::from_str(&raw).map_err(|e| {
            error!("Snapshot for user {} failed to decode: {}", user_id, e);
            ConversationError::corrupted(&key, e)
        })?;

        let original = snapshot.len();
        let dropped = snapshot.prune_expired(now);
        if dropped == 0 {
            return Ok(snapshot);
        }

        ctx.ensure_active("snapshot write-back")?;
        if snapshot.is_empty() {
            ctx.run("delete snapshot", self.cache.delete(&[key.as_str()])).await?;
            debug!("All {} messages expired for user {}, snapshot deleted", original, user_id);
        } else {
            let payload = serde_json::to_string(&snapshot)?;
            ctx.run("write back snapshot", self.cache.set(&key, &payload, None))
                .await?;
            debug!(
                "Dropped {} expired messages for user {} ({} remain)",
                dropped,
                user_id,
                snapshot.len()
            );
        }

        Ok(snapshot)
    }

    /// Persist the snapshot. Must succeed: an unreachable cache aborts before
    /// anything is written, and the write is read back and parsed when
    /// `verify_writes` is on.
    pub async fn save(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        snapshot: &mut ConversationSnapshot,
    ) -> Result<(), ConversationError> {
        let key = self.keys.snapshot(user_id);

        ctx.ensure_active("save snapshot")?;
        ctx.run("cache ping", self.cache.ping()).await.map_err(|e| {
            warn!("Cache unreachable, snapshot for user {} not saved: {}", user_id, e);
            e
        })?;

        snapshot.prune_expired(Utc::now());

        if snapshot.is_empty() {
            ctx.ensure_active("delete snapshot")?;
            return ctx.run("delete snapshot", self.cache.delete(&[key.as_str()])).await;
        }

        let payload = serde_json::to_string(snapshot)?;
        ctx.ensure_active("save snapshot")?;
        ctx.run("save snapshot", self.cache.set(&key, &payload, None))
            .await?;

        if self.settings.verify_writes {
            self.verify(ctx, &key).await?;
        }

        debug!(
            "Saved snapshot for user {} ({} messages, {} tokens)",
            user_id,
            snapshot.len(),
            snapshot.total_tokens
        );
        Ok(())
    }

    async fn verify(&self, ctx: &RequestContext, key: &str) -> Result<(), ConversationError> {
        let raw = ctx.run("verify snapshot", self.cache.get(key)).await?;
        let raw = raw.ok_or_else(|| ConversationError::VerificationFailed {
            key: key.to_string(),
            reason: "entry missing after write".to_string(),
        })?;

        serde_json::from_str::<ConversationSnapshot>(&raw).map_err(|e| {
            error!("Snapshot at {} unreadable right after write: {}", key, e);
            ConversationError::VerificationFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    /// Append a fully formed message (pending or completed).
    pub async fn append(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        message: ChatMessage,
    ) -> Result<ConversationSnapshot, ConversationError> {
        message.validate()?;

        let mut snapshot = self.load(ctx, user_id).await?;
        snapshot.push(message, Utc::now());
        self.save(ctx, user_id, &mut snapshot).await?;
        Ok(snapshot)
    }

    /// Record a query that has not been answered yet, with the default message TTL.
    pub async fn mark_pending(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
    ) -> Result<ChatMessage, ConversationError> {
        self.mark_pending_with_ttl(ctx, user_id, query, self.settings.message_ttl_chrono())
            .await
    }

    pub async fn mark_pending_with_ttl(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
        ttl: Duration,
    ) -> Result<ChatMessage, ConversationError> {
        let message = ChatMessage::pending(query, Utc::now(), ttl);
        self.append(ctx, user_id, message.clone()).await?;
        Ok(message)
    }

    /// Fill in the most recent pending message with this query.
    ///
    /// Returns `false` without writing when no such message exists; it may
    /// have expired or been completed by another request.
    pub async fn complete_pending(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
        completion: MessageCompletion,
    ) -> Result<bool, ConversationError> {
        self.update_latest_pending(ctx, user_id, query, |message, now| {
            message.complete(completion, now)
        })
        .await
    }

    /// Mark the most recent pending message with this query as failed.
    pub async fn fail_pending(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
        reason: Option<String>,
    ) -> Result<bool, ConversationError> {
        self.update_latest_pending(ctx, user_id, query, |message, now| message.fail(reason, now))
            .await
    }

    async fn update_latest_pending<F>(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
        update: F,
    ) -> Result<bool, ConversationError>
    where
        F: FnOnce(&mut ChatMessage, DateTime<Utc>) -> Result<(), ConversationError>,
    {
        let mut snapshot = self.load(ctx, user_id).await?;
        let now = Utc::now();

        let Some(message) = snapshot.latest_pending_mut(query) else {
            debug!("No pending message for user {} matching query, nothing to update", user_id);
            return Ok(false);
        };
        update(message, now)?;

        snapshot.recompute_tokens();
        snapshot.last_modified = now;
        self.save(ctx, user_id, &mut snapshot).await?;
        Ok(true)
    }

    /// The last `n` live messages, oldest first.
    pub async fn recent(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        n: usize,
    ) -> Result<Vec<ChatMessage>, ConversationError> {
        let snapshot = self.load(ctx, user_id).await?;
        Ok(snapshot.recent(n).to_vec())
    }

    pub async fn clear(&self, ctx: &RequestContext, user_id: &str) -> Result<(), ConversationError> {
        let key = self.keys.snapshot(user_id);
        ctx.ensure_active("clear snapshot")?;
        ctx.run("clear snapshot", self.cache.delete(&[key.as_str()])).await?;
        info!("Cleared snapshot for user {}", user_id);
        Ok(())
    }
}
