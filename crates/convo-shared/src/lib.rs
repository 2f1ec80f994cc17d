//! # Convo Shared
//! 
//! Configuration, telemetry and constants shared by the conversation cache crates.

pub mod constants;
pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{AppConfig, CacheConfig};
pub use error::AppError;
