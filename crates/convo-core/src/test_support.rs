//! Builders shared by unit tests.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{ChatMessage, MessageCompletion};

pub fn completed_message(query: &str, now: DateTime<Utc>, tokens: u64) -> ChatMessage {
    let completion = MessageCompletion {
        response: Some(format!("answer to {query}")),
        token_count: tokens,
        ..Default::default()
    };
    ChatMessage::completed(query, completion, now, Duration::hours(24))
}

/// Completed message created one hour before `expires_at`.
pub fn message_expiring_at(query: &str, expires_at: DateTime<Utc>, tokens: u64) -> ChatMessage {
    let created = expires_at - Duration::hours(1);
    let mut message = completed_message(query, created, tokens);
    message.expires_at = expires_at;
    message
}
