//! Unique request ID generation
//!
//! Provides thread-safe generation of correlation IDs for queued requests.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Request ID generator
#[derive(Debug)]
pub struct RequestIdGenerator {
    /// Atomic counter for sequential IDs
    counter: AtomicU64,
    /// Prefix for IDs (e.g., dispatcher name)
    prefix: String,
}

impl RequestIdGenerator {
    /// Create a new generator with a prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            counter: AtomicU64::new(1),
            prefix: prefix.into(),
        }
    }

    /// Generate the next request ID
    pub fn next_id(&self) -> String {
        let num = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, num)
    }

    /// Get current counter value (for debugging)
    pub fn current_value(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::with_prefix("req")
    }
}

/// Generate a globally unique tool ID
pub fn new_tool_id() -> String {
    format!("tool-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_id_generation() {
        let generator = RequestIdGenerator::with_prefix("queue");

        assert_eq!(generator.next_id(), "queue-1");
        assert_eq!(generator.next_id(), "queue-2");
        assert_eq!(generator.current_value(), 3);
    }

    #[test]
    fn test_default_prefix() {
        let generator = RequestIdGenerator::default();
        assert!(generator.next_id().starts_with("req-"));
    }

    #[test]
    fn test_tool_ids_are_unique() {
        let a = new_tool_id();
        let b = new_tool_id();
        assert!(a.starts_with("tool-"));
        assert_ne!(a, b);
    }
}
