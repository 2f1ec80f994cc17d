// ============================================================================
// Convo Core - Chat Message
// File: crates/convo-core/src/domain/message.rs
// ============================================================================
//! A single query/response exchange with its own expiration instant.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ConversationError;

/// Free-form JSON payload (context items, tool output). Unknown keys survive round-trips.
pub type OpaqueValue = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Pending,
    Completed,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Completed => "completed",
            MessageStatus::Error => "error",
        }
    }

    /// Only `pending` may move, and only forward.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Pending, MessageStatus::Completed)
                | (MessageStatus::Pending, MessageStatus::Error)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: OpaqueValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub output: OpaqueValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub query: String,
    #[serde(default)]
    pub contents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    /// `None` means "never gathered", `Some(vec![])` means "gathered, nothing found".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<OpaqueValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_queries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(default)]
    pub token_count: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
}

/// Fields written onto a pending message when its answer arrives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageCompletion {
    pub contents: Vec<String>,
    pub response: Option<String>,
    pub function_calls: Vec<FunctionCall>,
    pub tool_results: Vec<ToolResult>,
    pub context: Option<Vec<OpaqueValue>>,
    pub suggested_queries: Option<Vec<String>>,
    pub citations: Option<Vec<Citation>>,
    pub token_count: u64,
}

impl ChatMessage {
    /// A pending message with nothing but its query, expiring `ttl` after `now`.
    pub fn pending(query: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            query: query.into(),
            contents: Vec::new(),
            response: None,
            function_calls: Vec::new(),
            tool_results: Vec::new(),
            context: None,
            suggested_queries: None,
            citations: None,
            token_count: 0,
            created_at: now,
            expires_at: now + ttl,
            completed_at: None,
            status: MessageStatus::Pending,
        }
    }

    /// A completed message built in one step (history imports, direct appends).
    pub fn completed(
        query: impl Into<String>,
        completion: MessageCompletion,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let mut message = Self::pending(query, now, ttl);
        message.apply(completion, MessageStatus::Completed, now);
        message
    }

    pub fn validate(&self) -> Result<(), ConversationError> {
        if self.expires_at <= self.created_at {
            return Err(ConversationError::InvalidMessage(format!(
                "expiration {} is not after creation {}",
                self.expires_at, self.created_at
            )));
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    pub fn complete(
        &mut self,
        completion: MessageCompletion,
        now: DateTime<Utc>,
    ) -> Result<(), ConversationError> {
        self.transition(MessageStatus::Completed)?;
        self.apply(completion, MessageStatus::Completed, now);
        Ok(())
    }

    /// Mark a pending message as failed, keeping whatever partial output exists.
    pub fn fail(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), ConversationError> {
        self.transition(MessageStatus::Error)?;
        if reason.is_some() {
            self.response = reason;
        }
        self.completed_at = Some(now);
        self.status = MessageStatus::Error;
        Ok(())
    }

    fn transition(&self, next: MessageStatus) -> Result<(), ConversationError> {
        if !self.status.can_transition_to(next) {
            return Err(ConversationError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    fn apply(&mut self, completion: MessageCompletion, status: MessageStatus, now: DateTime<Utc>) {
        self.contents = completion.contents;
        self.response = completion.response;
        self.function_calls = completion.function_calls;
        self.tool_results = completion.tool_results;
        self.context = completion.context;
        self.suggested_queries = completion.suggested_queries;
        self.citations = completion.citations;
        self.token_count = completion.token_count;
        self.completed_at = Some(now);
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_message_expires_after_ttl() {
        let now = Utc::now();
        let msg = ChatMessage::pending("hello", now, Duration::hours(24));
        assert!(msg.validate().is_ok());
        assert!(!msg.is_expired(now));
        assert!(msg.is_expired(now + Duration::hours(24)));
        assert!(msg.is_pending());
    }

    #[test]
    fn test_validate_rejects_non_positive_ttl() {
        let now = Utc::now();
        let msg = ChatMessage::pending("hello", now, Duration::zero());
        assert!(matches!(msg.validate(), Err(ConversationError::InvalidMessage(_))));
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let now = Utc::now();
        let mut msg = ChatMessage::pending("q", now, Duration::hours(1));
        msg.complete(MessageCompletion::default(), now).unwrap();
        assert_eq!(msg.status, MessageStatus::Completed);

        let again = msg.complete(MessageCompletion::default(), now);
        assert!(matches!(again, Err(ConversationError::InvalidTransition { .. })));
        assert!(msg.fail(None, now).is_err());
    }

    #[test]
    fn test_absent_and_empty_optionals_stay_distinct() {
        let now = Utc::now();
        let mut msg = ChatMessage::pending("q", now, Duration::hours(1));
        msg.citations = Some(vec![]);

        let raw = serde_json::to_string(&msg).unwrap();
        assert!(raw.contains("\"citations\":[]"));
        assert!(!raw.contains("suggested_queries"));

        let back: ChatMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.citations, Some(vec![]));
        assert_eq!(back.suggested_queries, None);
        assert_eq!(back, msg);
    }

    #[test]
    fn test_opaque_fields_keep_unknown_keys() {
        let raw = json!({
            "query": "weather?",
            "created_at": "2026-01-01T00:00:00Z",
            "expires_at": "2026-01-02T00:00:00Z",
            "status": "completed",
            "context": [{"source": "sheet", "rows": [1, 2], "nested": {"k": true}}],
            "citations": [{"title": "Doc", "page": 4, "score": 0.9}]
        });

        let msg: ChatMessage = serde_json::from_value(raw.clone()).unwrap();
        let citation = &msg.citations.as_ref().unwrap()[0];
        assert_eq!(citation.extra.get("page"), Some(&json!(4)));

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["context"], raw["context"]);
        assert_eq!(back["citations"], raw["citations"]);
    }
}
