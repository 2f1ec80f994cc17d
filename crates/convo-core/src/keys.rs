//! Cache key layout: `<namespace>:<user_id>:<suffix>`

use convo_shared::constants::{ACTIVE_DATA_KEY_SUFFIX, POINTER_KEY_SUFFIX, SNAPSHOT_KEY_SUFFIX};

#[derive(Debug, Clone)]
pub struct CacheKeys {
    namespace: String,
}

impl CacheKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Unbounded snapshot, no key TTL.
    pub fn snapshot(&self, user_id: &str) -> String {
        self.key(user_id, SNAPSHOT_KEY_SUFFIX)
    }

    pub fn pointer(&self, user_id: &str) -> String {
        self.key(user_id, POINTER_KEY_SUFFIX)
    }

    pub fn active_data(&self, user_id: &str) -> String {
        self.key(user_id, ACTIVE_DATA_KEY_SUFFIX)
    }

    fn key(&self, user_id: &str, suffix: &str) -> String {
        format!("{}:{}:{}", self.namespace, user_id, suffix)
    }
}
