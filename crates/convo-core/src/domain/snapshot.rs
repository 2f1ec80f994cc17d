//! Per-user conversation snapshot: the expiring message list plus derived totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Insertion order is chronological order.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub total_tokens: u64,
    pub last_modified: DateTime<Utc>,
}

impl ConversationSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            messages: Vec::new(),
            total_tokens: 0,
            last_modified: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Drop every message with `expires_at <= now` and recompute the token total
    /// from the survivors. Returns how many messages were dropped.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_expired(now));
        self.recompute_tokens();
        before - self.messages.len()
    }

    pub fn recompute_tokens(&mut self) {
        self.total_tokens = self
            .messages
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.token_count));
    }

    pub fn push(&mut self, message: ChatMessage, now: DateTime<Utc>) {
        self.messages.push(message);
        self.recompute_tokens();
        self.last_modified = now;
    }

    /// Most recent pending message with the given query.
    pub fn latest_pending_mut(&mut self, query: &str) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.is_pending() && m.query == query)
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completed_message, message_expiring_at};
    use chrono::Duration;

    #[test]
    fn test_prune_drops_expired_and_recomputes_tokens() {
        let now = Utc::now();
        let mut snapshot = ConversationSnapshot::empty(now);
        snapshot.push(message_expiring_at("old", now - Duration::hours(2), 40), now);
        snapshot.push(completed_message("fresh", now, 7), now);
        snapshot.push(message_expiring_at("edge", now, 100), now);
        assert_eq!(snapshot.total_tokens, 147);

        let dropped = snapshot.prune_expired(now);
        assert_eq!(dropped, 2);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.messages[0].query, "fresh");
        assert_eq!(snapshot.total_tokens, 7);
    }

    #[test]
    fn test_token_total_saturates() {
        let now = Utc::now();
        let mut snapshot = ConversationSnapshot::empty(now);
        snapshot.push(completed_message("huge", now, u64::MAX), now);
        snapshot.push(completed_message("more", now, 10), now);
        assert_eq!(snapshot.total_tokens, u64::MAX);
    }

    #[test]
    fn test_total_is_recomputed_not_drifted() {
        let now = Utc::now();
        let mut snapshot = ConversationSnapshot::empty(now);
        snapshot.push(completed_message("a", now, 5), now);
        snapshot.total_tokens = 999;

        snapshot.prune_expired(now);
        assert_eq!(snapshot.total_tokens, 5);
    }

    #[test]
    fn test_latest_pending_prefers_most_recent() {
        let now = Utc::now();
        let mut snapshot = ConversationSnapshot::empty(now);
        snapshot.push(ChatMessage::pending("same", now, Duration::hours(1)), now);
        snapshot.push(ChatMessage::pending("same", now, Duration::hours(2)), now);

        let target = snapshot.latest_pending_mut("same").unwrap();
        assert_eq!(target.expires_at, now + Duration::hours(2));
        assert!(snapshot.latest_pending_mut("other").is_none());
    }

    #[test]
    fn test_recent_window() {
        let now = Utc::now();
        let mut snapshot = ConversationSnapshot::empty(now);
        for i in 0..5 {
            snapshot.push(completed_message(&format!("q{i}"), now, 1), now);
        }
        let recent: Vec<_> = snapshot.recent(2).iter().map(|m| m.query.as_str()).collect();
        assert_eq!(recent, vec!["q3", "q4"]);
        assert_eq!(snapshot.recent(10).len(), 5);
    }
}
