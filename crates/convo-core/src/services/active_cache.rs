// ============================================================================
// Convo Core - Active Conversation Cache
// File: crates/convo-core/src/services/active_cache.rs
// ============================================================================
//! Cache-aside window over the durable store for the user's active
//! conversation, stored under `user:<id>:active_conversation_data`.
//!
//! Reads always go to the store; the bounded entry is written after every
//! store read and is safe to lose at any time.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::RequestContext;
use crate::domain::{ActiveConversation, ChatMessage, ConversationView};
use crate::error::{ConversationError, ErrorKind};
use crate::keys::CacheKeys;
use crate::ports::{ConversationStore, KeyValueCache};
use crate::settings::CacheSettings;

use super::pointer::ActivePointer;

/// Result of a cached-message patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// Entry missing or out of sync with the store; it was dropped so the
    /// next read rebuilds it.
    Invalidated,
}

#[derive(Clone)]
pub struct ActiveConversationCache {
    cache: Arc<dyn KeyValueCache>,
    store: Arc<dyn ConversationStore>,
    pointer: ActivePointer,
    keys: CacheKeys,
    settings: CacheSettings,
}

impl ActiveConversationCache {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        store: Arc<dyn ConversationStore>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            pointer: ActivePointer::new(cache.clone(), &settings),
            keys: CacheKeys::new(settings.key_namespace.clone()),
            cache,
            store,
            settings,
        }
    }

    pub fn pointer(&self) -> &ActivePointer {
        &self.pointer
    }

    /// Full content of the active conversation, read from the store.
    /// No pointer means an empty view.
    pub async fn read_active(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<ConversationView, ConversationError> {
        let Some(conversation_id) = self.pointer.get(ctx, user_id).await? else {
            debug!("User {} has no active conversation", user_id);
            return Ok(ConversationView::empty());
        };

        let Some(view) = self.load_from_store(ctx, user_id, &conversation_id).await? else {
            warn!(
                "Active pointer for user {} names unknown conversation {}, clearing",
                user_id, conversation_id
            );
            self.clear_quietly(ctx, user_id).await;
            return Ok(ConversationView::empty());
        };

        self.store_active_quietly(ctx, user_id, &view).await;
        Ok(view)
    }

    /// Make `conversation_id` the active one. Fails with `NotOwned` before
    /// touching any key if the store does not return it for this user.
    pub async fn switch_active(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationView, ConversationError> {
        let view = self
            .load_from_store(ctx, user_id, conversation_id)
            .await?
            .ok_or_else(|| {
                warn!(
                    "User {} tried to switch to conversation {} they do not own",
                    user_id, conversation_id
                );
                ConversationError::NotOwned {
                    user_id: user_id.to_string(),
                    conversation_id: conversation_id.to_string(),
                }
            })?;

        self.pointer.invalidate_data(ctx, user_id).await?;
        self.pointer.set(ctx, user_id, conversation_id).await?;
        self.store_active_quietly(ctx, user_id, &view).await;

        info!(
            "User {} switched to conversation {} ({} messages)",
            user_id,
            conversation_id,
            view.message_count()
        );
        Ok(view)
    }

    async fn load_from_store(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ConversationView>, ConversationError> {
        let messages = ctx
            .run(
                "fetch conversation messages",
                self.store.fetch_messages(user_id, conversation_id),
            )
            .await?;
        let Some(messages) = messages else {
            return Ok(None);
        };

        let title = ctx
            .run("fetch conversation title", self.store.fetch_title(conversation_id))
            .await?
            .unwrap_or_default();

        Ok(Some(ConversationView::new(conversation_id, title, messages)))
    }

    /// Write the bounded window for `view`.
    pub async fn store_active(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        view: &ConversationView,
    ) -> Result<(), ConversationError> {
        let Some(entry) = ActiveConversation::from_view(view, self.settings.window_size, Utc::now())
        else {
            return Ok(());
        };
        self.write_entry(ctx, user_id, &entry).await
    }

    /// Best-effort variant of [`store_active`](Self::store_active).
    pub async fn store_active_quietly(&self, ctx: &RequestContext, user_id: &str, view: &ConversationView) {
        if let Err(e) = self.store_active(ctx, user_id, view).await {
            warn!("Failed to cache active conversation for user {}: {}", user_id, e);
        }
    }

    async fn write_entry(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        entry: &ActiveConversation,
    ) -> Result<(), ConversationError> {
        let key = self.keys.active_data(user_id);
        let payload = serde_json::to_string(entry)?;
        ctx.ensure_active("store active conversation")?;
        ctx.run(
            "store active conversation",
            self.cache.set(&key, &payload, Some(self.settings.active_data_ttl)),
        )
        .await?;
        debug!(
            "Cached {} messages of conversation {} for user {}",
            entry.message_count, entry.conversation_id, user_id
        );
        Ok(())
    }

    /// The bounded entry as cached, without consulting the store. A corrupt
    /// entry is deleted and reported; the next read rebuilds it.
    pub async fn cached(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<Option<ActiveConversation>, ConversationError> {
        let key = self.keys.active_data(user_id);
        let Some(raw) = ctx.run("get active conversation", self.cache.get(&key)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<ActiveConversation>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                error!("Active conversation cache for user {} is corrupt: {}", user_id, e);
                self.pointer.invalidate_data_quietly(ctx, user_id).await;
                Err(ConversationError::corrupted(&key, e))
            }
        }
    }

    /// Apply `mutate` to the most recent cached message with this query.
    ///
    /// On a miss, when no cached message matches, or when `mutate` rejects
    /// the message it was given, the entry is dropped instead and nothing
    /// is written.
    pub async fn try_patch_message<F>(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        query: &str,
        mutate: F,
    ) -> Result<PatchOutcome, ConversationError>
    where
        F: FnOnce(&mut ChatMessage) -> Result<(), ConversationError> + Send,
    {
        let mut entry = match self.cached(ctx, user_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.pointer.invalidate_data(ctx, user_id).await?;
                return Ok(PatchOutcome::Invalidated);
            }
            Err(e) if e.kind() == ErrorKind::Corruption => return Ok(PatchOutcome::Invalidated),
            Err(e) => return Err(e),
        };

        let Some(message) = entry.latest_by_query_mut(query) else {
            debug!(
                "No cached message for user {} matches the patch, invalidating",
                user_id
            );
            self.pointer.invalidate_data(ctx, user_id).await?;
            return Ok(PatchOutcome::Invalidated);
        };
        if let Err(e) = mutate(message) {
            debug!(
                "Cached message for user {} cannot take the patch ({}), invalidating",
                user_id, e
            );
            self.pointer.invalidate_data(ctx, user_id).await?;
            return Ok(PatchOutcome::Invalidated);
        }
        entry.updated_at = Utc::now();

        self.write_entry(ctx, user_id, &entry).await?;
        Ok(PatchOutcome::Applied)
    }

    /// Best-effort variant of [`try_patch_message`](Self::try_patch_message).
    pub async fn patch_message<F>(&self, ctx: &RequestContext, user_id: &str, query: &str, mutate: F)
    where
        F: FnOnce(&mut ChatMessage) -> Result<(), ConversationError> + Send,
    {
        if let Err(e) = self.try_patch_message(ctx, user_id, query, mutate).await {
            warn!("Failed to patch active conversation cache for user {}: {}", user_id, e);
        }
    }

    /// Drop the bounded entry.
    pub async fn invalidate(&self, ctx: &RequestContext, user_id: &str) -> Result<(), ConversationError> {
        self.pointer.invalidate_data(ctx, user_id).await
    }

    /// Remove the bounded entry and the pointer in a single delete.
    pub async fn clear(&self, ctx: &RequestContext, user_id: &str) -> Result<(), ConversationError> {
        let data_key = self.keys.active_data(user_id);
        let pointer_key = self.keys.pointer(user_id);
        ctx.ensure_active("clear active conversation")?;
        ctx.run(
            "clear active conversation",
            self.cache.delete(&[data_key.as_str(), pointer_key.as_str()]),
        )
        .await?;
        info!("Cleared active conversation for user {}", user_id);
        Ok(())
    }

    pub async fn clear_quietly(&self, ctx: &RequestContext, user_id: &str) {
        if let Err(e) = self.clear(ctx, user_id).await {
            warn!("Failed to clear active conversation for user {}: {}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::domain::MessageStatus;
    use crate::ports::MockConversationStore;
    use crate::test_support::completed_message;
    use async_trait::async_trait;
    use std::time::Duration;

    const USER: &str = "u1";
    const DATA_KEY: &str = "user:u1:active_conversation_data";
    const POINTER_KEY: &str = "user:u1:active_conversation_id";

    fn messages(prefix: &str, n: usize) -> Vec<ChatMessage> {
        let now = Utc::now();
        (1..=n)
            .map(|i| completed_message(&format!("{prefix}{i}"), now, 1))
            .collect()
    }

    /// Store that knows conversations `c1` (20 messages) and `c2` (3 messages) for `u1`.
    fn store_with_two_conversations() -> MockConversationStore {
        let c1 = messages("a", 20);
        let c2 = messages("b", 3);
        let mut store = MockConversationStore::new();
        store
            .expect_fetch_messages()
            .returning(move |user, conversation| match (user, conversation) {
                ("u1", "c1") => Ok(Some(c1.clone())),
                ("u1", "c2") => Ok(Some(c2.clone())),
                _ => Ok(None),
            });
        store
            .expect_fetch_title()
            .returning(|conversation| Ok(Some(format!("Title {conversation}"))));
        store
    }

    fn service(cache: &InMemoryCache, store: MockConversationStore) -> ActiveConversationCache {
        ActiveConversationCache::new(Arc::new(cache.clone()), Arc::new(store), CacheSettings::default())
    }

    #[tokio::test]
    async fn test_read_without_pointer_is_empty() {
        let cache = InMemoryCache::new();
        let mut store = MockConversationStore::new();
        store.expect_fetch_messages().never();
        let active = service(&cache, store);

        let view = active.read_active(&RequestContext::background(), USER).await.unwrap();
        assert!(view.is_empty());
        assert!(view.messages.is_empty());
    }

    #[tokio::test]
    async fn test_read_returns_full_history_and_caches_window() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        let ctx = RequestContext::background();
        cache.set(POINTER_KEY, "c1", None).await.unwrap();

        let view = active.read_active(&ctx, USER).await.unwrap();
        assert_eq!(view.conversation_id.as_deref(), Some("c1"));
        assert_eq!(view.title, "Title c1");
        assert_eq!(view.message_count(), 20);

        let entry = active.cached(&ctx, USER).await.unwrap().unwrap();
        assert_eq!(entry.message_count, 15);
        assert_eq!(entry.messages.len(), 15);
        assert_eq!(entry.messages.first().unwrap().query, "a6");
        assert_eq!(entry.messages.last().unwrap().query, "a20");

        let ttl = cache.ttl(DATA_KEY).unwrap();
        assert!(ttl <= Duration::from_secs(24 * 3600));
        assert!(ttl > Duration::from_secs(23 * 3600));
    }

    #[tokio::test]
    async fn test_switch_then_read_returns_new_conversation() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        let ctx = RequestContext::background();

        active.switch_active(&ctx, USER, "c1").await.unwrap();
        let before = active.cached(&ctx, USER).await.unwrap().unwrap();
        assert_eq!(before.conversation_id, "c1");

        let switched = active.switch_active(&ctx, USER, "c2").await.unwrap();
        assert_eq!(switched.message_count(), 3);

        let entry = active.cached(&ctx, USER).await.unwrap().unwrap();
        assert_eq!(entry.conversation_id, "c2");
        assert_eq!(entry.message_count, 3);

        let view = active.read_active(&ctx, USER).await.unwrap();
        assert_eq!(view.conversation_id.as_deref(), Some("c2"));
        assert_eq!(view.messages[0].query, "b1");
    }

    #[tokio::test]
    async fn test_switch_to_foreign_conversation_changes_nothing() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        let ctx = RequestContext::background();
        active.switch_active(&ctx, USER, "c1").await.unwrap();

        let err = active.switch_active(&ctx, USER, "someone-elses").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ownership);

        assert_eq!(active.pointer().get(&ctx, USER).await.unwrap().as_deref(), Some("c1"));
        assert!(cache.contains(DATA_KEY));
    }

    #[tokio::test]
    async fn test_stale_pointer_reads_empty_and_clears() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        cache.set(POINTER_KEY, "deleted", None).await.unwrap();

        let view = active.read_active(&RequestContext::background(), USER).await.unwrap();
        assert!(view.is_empty());
        assert!(!cache.contains(POINTER_KEY));
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_fail_read() {
        let cache = InMemoryCache::new();
        let flaky = FailingWrites { inner: cache.clone() };
        cache.set(POINTER_KEY, "c2", None).await.unwrap();
        let active = ActiveConversationCache::new(
            Arc::new(flaky),
            Arc::new(store_with_two_conversations()),
            CacheSettings::default(),
        );

        let view = active.read_active(&RequestContext::background(), USER).await.unwrap();
        assert_eq!(view.message_count(), 3);
        assert!(!cache.contains(DATA_KEY));
    }

    #[tokio::test]
    async fn test_store_outage_surfaces() {
        let cache = InMemoryCache::new();
        cache.set(POINTER_KEY, "c1", None).await.unwrap();
        let mut store = MockConversationStore::new();
        store
            .expect_fetch_messages()
            .returning(|_, _| Err(ConversationError::StoreUnavailable("connection refused".into())));
        let active = service(&cache, store);

        let err = active.read_active(&RequestContext::background(), USER).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_patch_hit_updates_in_place() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        let ctx = RequestContext::background();
        active.switch_active(&ctx, USER, "c2").await.unwrap();

        let outcome = active
            .try_patch_message(&ctx, USER, "b2", |m| {
                m.response = Some("patched".into());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Applied);

        let entry = active.cached(&ctx, USER).await.unwrap().unwrap();
        assert_eq!(entry.messages[1].response.as_deref(), Some("patched"));
        assert_eq!(entry.messages[1].status, MessageStatus::Completed);
    }

    #[tokio::test]
    async fn test_patch_without_match_invalidates() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        let ctx = RequestContext::background();
        active.switch_active(&ctx, USER, "c2").await.unwrap();

        let outcome = active
            .try_patch_message(&ctx, USER, "never asked", |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Invalidated);
        assert!(!cache.contains(DATA_KEY));
    }

    #[tokio::test]
    async fn test_rejected_mutation_invalidates_without_writing() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        let ctx = RequestContext::background();
        active.switch_active(&ctx, USER, "c2").await.unwrap();

        let outcome = active
            .try_patch_message(&ctx, USER, "b3", |m| m.fail(Some("late failure".into()), Utc::now()))
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Invalidated);
        assert!(!cache.contains(DATA_KEY));
        assert!(cache.contains(POINTER_KEY));
    }

    #[tokio::test]
    async fn test_patch_on_miss_invalidates() {
        let cache = InMemoryCache::new();
        let active = service(&cache, MockConversationStore::new());

        let outcome = active
            .try_patch_message(&RequestContext::background(), USER, "q", |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Invalidated);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_deleted() {
        let cache = InMemoryCache::new();
        let active = service(&cache, MockConversationStore::new());
        let ctx = RequestContext::background();
        cache.set(DATA_KEY, "[[[", None).await.unwrap();

        let err = active.cached(&ctx, USER).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(!cache.contains(DATA_KEY));

        cache.set(DATA_KEY, "[[[", None).await.unwrap();
        let outcome = active.try_patch_message(&ctx, USER, "q", |_| Ok(())).await.unwrap();
        assert_eq!(outcome, PatchOutcome::Invalidated);
    }

    #[tokio::test]
    async fn test_clear_removes_pointer_and_data() {
        let cache = InMemoryCache::new();
        let active = service(&cache, store_with_two_conversations());
        let ctx = RequestContext::background();
        active.switch_active(&ctx, USER, "c1").await.unwrap();

        active.clear(&ctx, USER).await.unwrap();
        assert!(!cache.contains(DATA_KEY));
        assert!(!cache.contains(POINTER_KEY));
        assert!(active.read_active(&ctx, USER).await.unwrap().is_empty());

        active.invalidate(&ctx, USER).await.unwrap();
        active.invalidate(&ctx, USER).await.unwrap();
    }

    struct SlowStore;

    #[async_trait]
    impl ConversationStore for SlowStore {
        async fn fetch_messages(
            &self,
            _user_id: &str,
            _conversation_id: &str,
        ) -> Result<Option<Vec<ChatMessage>>, ConversationError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Some(Vec::new()))
        }

        async fn fetch_title(&self, _conversation_id: &str) -> Result<Option<String>, ConversationError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_switch_times_out_without_moving_pointer() {
        let cache = InMemoryCache::new();
        cache.set(POINTER_KEY, "c1", None).await.unwrap();
        let active =
            ActiveConversationCache::new(Arc::new(cache.clone()), Arc::new(SlowStore), CacheSettings::default());

        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let err = active.switch_active(&ctx, USER, "c9").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(cache.get(POINTER_KEY).await.unwrap().as_deref(), Some("c1"));
    }

    /// Reads pass through, writes of the bounded entry fail.
    struct FailingWrites {
        inner: InMemoryCache,
    }

    #[async_trait]
    impl KeyValueCache for FailingWrites {
        async fn ping(&self) -> Result<(), ConversationError> {
            Ok(())
        }
        async fn get(&self, key: &str) -> Result<Option<String>, ConversationError> {
            self.inner.get(key).await
        }
        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), ConversationError> {
            Err(ConversationError::CacheUnavailable("write rejected".into()))
        }
        async fn delete(&self, keys: &[&str]) -> Result<(), ConversationError> {
            self.inner.delete(keys).await
        }
    }
}
