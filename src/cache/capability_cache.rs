//! Mirror of the resource and prompt listings advertised by the remote host

use crate::core::protocol::{PromptDescriptor, ResourceDescriptor};
use crate::utils::metrics::AtomicCounter;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

/// Lookup and refresh counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicCounter,
    pub misses: AtomicCounter,
    pub refreshes: AtomicCounter,
}

impl CacheMetrics {
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.get(),
            misses: self.misses.get(),
            refreshes: self.refreshes.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
}

impl CacheMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// Last synced resource and prompt listings, keyed by URI and name
#[derive(Debug, Default)]
pub struct CapabilityCache {
    resources: DashMap<String, ResourceDescriptor>,
    prompts: DashMap<String, PromptDescriptor>,
    resources_synced_at: parking_lot::Mutex<Option<Instant>>,
    prompts_synced_at: parking_lot::Mutex<Option<Instant>>,
    metrics: CacheMetrics,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resource listing wholesale
    pub fn replace_resources(&self, resources: Vec<ResourceDescriptor>) {
        self.resources.clear();
        for resource in resources {
            self.resources.insert(resource.uri.clone(), resource);
        }
        *self.resources_synced_at.lock() = Some(Instant::now());
        self.metrics.refreshes.increment();
        debug!("Cached {} resources", self.resources.len());
    }

    /// Replace the prompt listing wholesale
    pub fn replace_prompts(&self, prompts: Vec<PromptDescriptor>) {
        self.prompts.clear();
        for prompt in prompts {
            self.prompts.insert(prompt.name.clone(), prompt);
        }
        *self.prompts_synced_at.lock() = Some(Instant::now());
        self.metrics.refreshes.increment();
        debug!("Cached {} prompts", self.prompts.len());
    }

    pub fn resource(&self, uri: &str) -> Option<ResourceDescriptor> {
        match self.resources.get(uri) {
            Some(entry) => {
                self.metrics.hits.increment();
                Some(entry.value().clone())
            }
            None => {
                self.metrics.misses.increment();
                None
            }
        }
    }

    pub fn prompt(&self, name: &str) -> Option<PromptDescriptor> {
        match self.prompts.get(name) {
            Some(entry) => {
                self.metrics.hits.increment();
                Some(entry.value().clone())
            }
            None => {
                self.metrics.misses.increment();
                None
            }
        }
    }

    /// Resources sorted by URI
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        let mut all: Vec<_> = self.resources.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.uri.cmp(&b.uri));
        all
    }

    /// Prompts sorted by name
    pub fn prompts(&self) -> Vec<PromptDescriptor> {
        let mut all: Vec<_> = self.prompts.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }

    /// Time since the resource listing was last refreshed
    pub fn resources_age(&self) -> Option<std::time::Duration> {
        self.resources_synced_at.lock().map(|at| at.elapsed())
    }

    pub fn prompts_age(&self) -> Option<std::time::Duration> {
        self.prompts_synced_at.lock().map(|at| at.elapsed())
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn clear(&self) {
        self.resources.clear();
        self.prompts.clear();
        *self.resources_synced_at.lock() = None;
        *self.prompts_synced_at.lock() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.prompts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(uri: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            uri: uri.to_string(),
            name: None,
            description: None,
            mime_type: Some("text/plain".to_string()),
        }
    }

    fn prompt(name: &str) -> PromptDescriptor {
        PromptDescriptor {
            name: name.to_string(),
            description: None,
            arguments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_replace_drops_stale_entries() {
        let cache = CapabilityCache::new();
        cache.replace_resources(vec![resource("file:///a"), resource("file:///b")]);
        cache.replace_resources(vec![resource("file:///b")]);

        assert_eq!(cache.resource_count(), 1);
        assert!(cache.resource("file:///a").is_none());
        assert!(cache.resource("file:///b").is_some());
        assert!(cache.resources_age().is_some());
        assert!(cache.prompts_age().is_none());
    }

    #[tokio::test]
    async fn test_listings_are_independent() {
        let cache = CapabilityCache::new();
        cache.replace_prompts(vec![prompt("summarize"), prompt("greet")]);
        assert_eq!(cache.prompt_count(), 2);
        assert_eq!(cache.resource_count(), 0);

        let names: Vec<_> = cache.prompts().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["greet", "summarize"]);
    }

    #[tokio::test]
    async fn test_metrics_and_clear() {
        let cache = CapabilityCache::new();
        cache.replace_prompts(vec![prompt("greet")]);
        assert!(cache.prompt("greet").is_some());
        assert!(cache.prompt("missing").is_none());

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.refreshes, 1);
        assert!((metrics.hit_rate() - 50.0).abs() < f64::EPSILON);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.prompts_age().is_none());
    }
}
