//! In-process cache adapter

mod memory;

pub use memory::InMemoryCache;
