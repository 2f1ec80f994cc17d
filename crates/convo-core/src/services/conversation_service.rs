//! Write-side glue: snapshot writes that must succeed, followed by
//! opportunistic maintenance of the active-conversation cache.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::context::RequestContext;
use crate::domain::{ChatMessage, ConversationSnapshot, ConversationView, MessageCompletion};
use crate::error::ConversationError;
use crate::ports::{ConversationStore, KeyValueCache};
use crate::settings::CacheSettings;

use super::active_cache::ActiveConversationCache;
use super::history::ConversationHistory;

#[derive(Clone)]
pub struct ConversationService {
    history: ConversationHistory,
    active: ActiveConversationCache,
}

impl ConversationService {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        store: Arc<dyn ConversationStore>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            history: ConversationHistory::new(cache.clone(), settings.clone()),
            active: ActiveConversationCache::new(cache, store, settings),
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn active(&self) -> &ActiveConversationCache {
        &self.active
    }

    /// Record the user's query as pending before generation starts.
    pub async fn begin_turn(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
    ) -> Result<ChatMessage, ConversationError> {
        self.history.mark_pending(ctx, user_id, query).await
    }

    /// Store the answer. The snapshot write must succeed; the cached window
    /// is patched on a best-effort basis afterwards. If the newest cached
    /// message with this query is not pending, the window is dropped.
    pub async fn finish_turn(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
        completion: MessageCompletion,
    ) -> Result<bool, ConversationError> {
        let updated = self
            .history
            .complete_pending(ctx, user_id, query, completion.clone())
            .await?;

        if updated {
            let now = Utc::now();
            self.active
                .patch_message(ctx, user_id, query, move |message| {
                    message.complete(completion, now)
                })
                .await;
        }
        Ok(updated)
    }

    /// Mark the query as failed.
    pub async fn abort_turn(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
        reason: Option<String>,
    ) -> Result<bool, ConversationError> {
        let updated = self
            .history
            .fail_pending(ctx, user_id, query, reason.clone())
            .await?;

        if updated {
            let now = Utc::now();
            self.active
                .patch_message(ctx, user_id, query, move |message| message.fail(reason, now))
                .await;
        }
        Ok(updated)
    }

    pub async fn snapshot(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<ConversationSnapshot, ConversationError> {
        self.history.load(ctx, user_id).await
    }

    pub async fn read_active(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<ConversationView, ConversationError> {
        self.active.read_active(ctx, user_id).await
    }

    pub async fn switch(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationView, ConversationError> {
        self.active.switch_active(ctx, user_id, conversation_id).await
    }

    /// Notify that `conversation_id` changed in the durable store.
    pub async fn conversation_modified(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<bool, ConversationError> {
        self.active
            .pointer()
            .invalidate_for_conversation(ctx, user_id, conversation_id)
            .await
    }

    /// Remove every cache entry the user has: bounded window, pointer and snapshot.
    pub async fn teardown(&self, ctx: &RequestContext, user_id: &str) -> Result<(), ConversationError> {
        self.active.clear(ctx, user_id).await?;
        self.history.clear(ctx, user_id).await?;
        info!("Tore down conversation cache for user {}", user_id);
        Ok(())
    }
}
