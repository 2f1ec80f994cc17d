//! Active conversation: the bounded cache entry and the caller-facing view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

/// Window of the most recent messages of the active conversation, as stored
/// under `user:<id>:active_conversation_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveConversation {
    pub conversation_id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
    pub last_accessed: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveConversation {
    /// Build a bounded entry holding at most `window` of the newest messages.
    pub fn from_view(view: &ConversationView, window: usize, now: DateTime<Utc>) -> Option<Self> {
        let conversation_id = view.conversation_id.clone()?;
        let mut entry = Self {
            conversation_id,
            title: view.title.clone(),
            messages: view.messages.clone(),
            message_count: 0,
            last_accessed: now,
            updated_at: now,
        };
        entry.trim_to(window);
        Some(entry)
    }

    /// Drop the oldest messages until at most `window` remain.
    pub fn trim_to(&mut self, window: usize) {
        if self.messages.len() > window {
            let excess = self.messages.len() - window;
            self.messages.drain(..excess);
        }
        self.message_count = self.messages.len();
    }

    /// Append and keep the window, tail-biased.
    pub fn push(&mut self, message: ChatMessage, window: usize, now: DateTime<Utc>) {
        self.messages.push(message);
        self.trim_to(window);
        self.updated_at = now;
    }

    pub fn latest_by_query_mut(&mut self, query: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|m| m.query == query)
    }
}

/// Full conversation content as returned to callers. `conversation_id` is
/// `None` when the user has no active conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation_id: Option<String>,
    pub title: String,
    pub messages: Vec<ChatMessage>,
}

impl ConversationView {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(conversation_id: impl Into<String>, title: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            title: title.into(),
            messages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_none()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
