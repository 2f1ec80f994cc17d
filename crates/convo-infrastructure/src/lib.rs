//! # Convo Infrastructure
//! 
//! Redis and PostgreSQL adapters for the conversation cache ports.

pub mod cache;
pub mod database;

pub use cache::{create_redis_pool, RedisCache};
pub use database::{create_pool, PgConversationStore};
