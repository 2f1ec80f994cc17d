//! Conversation cache services

pub mod active_cache;
pub mod conversation_service;
pub mod history;
pub mod pointer;

pub use active_cache::{ActiveConversationCache, PatchOutcome};
pub use conversation_service::ConversationService;
pub use history::ConversationHistory;
pub use pointer::ActivePointer;
