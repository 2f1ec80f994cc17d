//! Database module (PostgreSQL adapters)

pub mod connection;
pub mod conversation_store;

pub use connection::create_pool;
pub use conversation_store::PgConversationStore;
