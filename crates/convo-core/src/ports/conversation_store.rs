//! Durable conversation store port

use async_trait::async_trait;

use crate::domain::ChatMessage;
use crate::error::ConversationError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All messages of `conversation_id` in chronological order, scoped to
    /// `user_id`. `None` when the conversation does not exist for that user.
    async fn fetch_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Vec<ChatMessage>>, ConversationError>;

    async fn fetch_title(&self, conversation_id: &str) -> Result<Option<String>, ConversationError>;
}
