//! Application-wide constants

pub const DEFAULT_KEY_NAMESPACE: &str = "user";
pub const SNAPSHOT_KEY_SUFFIX: &str = "conversation";
pub const POINTER_KEY_SUFFIX: &str = "active_conversation_id";
pub const ACTIVE_DATA_KEY_SUFFIX: &str = "active_conversation_data";

/// 24 hours
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 86_400;
/// 7 days
pub const DEFAULT_POINTER_TTL_SECS: u64 = 604_800;
/// 24 hours
pub const DEFAULT_ACTIVE_DATA_TTL_SECS: u64 = 86_400;
pub const DEFAULT_WINDOW_SIZE: usize = 15;
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;
