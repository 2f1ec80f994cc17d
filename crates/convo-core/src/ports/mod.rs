//! Ports implemented by the cache and durable store adapters

pub mod conversation_store;
pub mod key_value_cache;

pub use conversation_store::ConversationStore;
pub use key_value_cache::KeyValueCache;

#[cfg(test)]
pub use conversation_store::MockConversationStore;
