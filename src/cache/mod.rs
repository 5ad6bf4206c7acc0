pub mod capability_cache;

pub use capability_cache::{CacheMetricsSnapshot, CapabilityCache};
