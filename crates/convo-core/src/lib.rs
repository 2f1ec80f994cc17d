//! # Convo Core
//! 
//! Domain types, ports and services for the per-user conversation cache:
//! the expiring conversation snapshot, the active-conversation pointer and
//! the bounded cache that shadows the durable store.

pub mod cache;
pub mod context;
pub mod domain;
pub mod error;
pub mod keys;
pub mod ports;
pub mod services;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::InMemoryCache;
pub use context::RequestContext;
pub use domain::*;
pub use error::{ConversationError, ErrorKind};
pub use keys::CacheKeys;
pub use ports::{ConversationStore, KeyValueCache};
pub use services::{
    ActiveConversationCache, ActivePointer, ConversationHistory, ConversationService,
    PatchOutcome,
};
pub use settings::CacheSettings;
