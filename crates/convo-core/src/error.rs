//! Conversation cache errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupted entry at {key}: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("Write verification failed at {key}: {reason}")]
    VerificationFailed { key: String, reason: String },

    #[error("Conversation {conversation_id} is not owned by user {user_id}")]
    NotOwned { user_id: String, conversation_id: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by callers to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Corruption,
    Ownership,
    Validation,
    Timeout,
}

impl ConversationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CacheUnavailable(_) | Self::StoreUnavailable(_) => ErrorKind::Connectivity,
            Self::Corrupted { .. } | Self::VerificationFailed { .. } => ErrorKind::Corruption,
            Self::NotOwned { .. } => ErrorKind::Ownership,
            Self::InvalidMessage(_) | Self::InvalidTransition { .. } | Self::Serialization(_) => {
                ErrorKind::Validation
            }
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub(crate) fn corrupted(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Corrupted {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}
