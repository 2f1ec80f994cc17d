// ============================================================================
// Convo Infrastructure - PostgreSQL Conversation Store
// File: crates/convo-infrastructure/src/database/conversation_store.rs
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, error};

use convo_core::domain::ChatMessage;
use convo_core::error::ConversationError;
use convo_core::ports::ConversationStore;

pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn is_owned_by(&self, user_id: &str, conversation_id: &str) -> Result<bool, ConversationError> {
        let row: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM conversations
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e: sqlx::Error| store_error("ownership check", e))?;

        Ok(row.is_some())
    }
}

fn store_error(op: &str, e: sqlx::Error) -> ConversationError {
    error!("Database error during {}: {:?}", op, e);
    ConversationError::StoreUnavailable(e.to_string())
}

fn decode_payloads(conversation_id: &str, payloads: Vec<Value>) -> Result<Vec<ChatMessage>, ConversationError> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(position, payload)| {
            serde_json::from_value(payload).map_err(|e| {
                error!(
                    "Undecodable message #{} in conversation {}: {}",
                    position, conversation_id, e
                );
                ConversationError::Corrupted {
                    key: format!("conversation_messages/{}#{}", conversation_id, position),
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn fetch_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Vec<ChatMessage>>, ConversationError> {
        if !self.is_owned_by(user_id, conversation_id).await? {
            debug!("Conversation {} not found for user {}", conversation_id, user_id);
            return Ok(None);
        }

        let payloads: Vec<Value> = sqlx::query_scalar(
            r#"
            SELECT payload FROM conversation_messages
            WHERE conversation_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e: sqlx::Error| store_error("message fetch", e))?;

        decode_payloads(conversation_id, payloads).map(Some)
    }

    async fn fetch_title(&self, conversation_id: &str) -> Result<Option<String>, ConversationError> {
        let title: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT title FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e: sqlx::Error| store_error("title fetch", e))?;

        Ok(title.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_decode_payloads_keeps_order() {
        let payloads = vec![
            json!({
                "query": "first",
                "contents": [],
                "token_count": 3,
                "created_at": "2026-01-01T10:00:00Z",
                "expires_at": "2026-01-02T10:00:00Z",
                "status": "completed"
            }),
            json!({
                "query": "second",
                "contents": ["ctx"],
                "token_count": 5,
                "created_at": "2026-01-01T10:05:00Z",
                "expires_at": "2026-01-02T10:05:00Z",
                "status": "pending"
            }),
        ];

        let messages = decode_payloads("c1", payloads).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].query, "first");
        assert_eq!(messages[1].query, "second");
        assert!(messages[1].is_pending());
    }

    #[test]
    fn test_undecodable_payload_is_corruption() {
        let err = decode_payloads("c1", vec![json!({"query": 42})]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn test_sqlx_error_maps_to_connectivity() {
        let err = store_error("title fetch", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }
}
