//! Per-request deadline threaded through every cache and store call.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::error::ConversationError;

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// No deadline.
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails with `Timeout` once the deadline has passed. Called before every write.
    pub fn ensure_active(&self, operation: &str) -> Result<(), ConversationError> {
        if self.is_expired() {
            warn!("Deadline passed before {}", operation);
            return Err(ConversationError::Timeout(operation.to_string()));
        }
        Ok(())
    }

    /// Drive `fut` to completion or until the deadline, whichever comes first.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T, ConversationError>
    where
        F: Future<Output = Result<T, ConversationError>>,
    {
        let Some(deadline) = self.deadline else {
            return fut.await;
        };

        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Deadline exceeded during {}", operation);
                Err(ConversationError::Timeout(operation.to_string()))
            }
        }
    }
}
