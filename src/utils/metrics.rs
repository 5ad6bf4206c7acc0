//! Lock-free counters shared by the dispatchers and caches

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotone counter that can be cloned into spawned tasks
#[derive(Debug, Clone, Default)]
pub struct AtomicCounter(Arc<AtomicU64>);

impl AtomicCounter {
    #[inline]
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fold one sample into a running mean over `count` samples (including it)
pub fn running_mean(current: f64, sample: f64, count: u64) -> f64 {
    if count == 0 {
        return current;
    }
    current + (sample - current) / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_shared_between_clones() {
        let counter = AtomicCounter::default();
        let clone = counter.clone();
        counter.increment();
        clone.add(2);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_running_mean_matches_arithmetic_mean() {
        let samples = [12.0, 7.5, 30.0, 0.5, 18.25];
        let mut mean = 0.0;
        for (i, s) in samples.iter().enumerate() {
            mean = running_mean(mean, *s, i as u64 + 1);
        }
        let expected = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - expected).abs() < 1e-9);
    }

    #[test]
    fn test_running_mean_ignores_zero_count() {
        assert_eq!(running_mean(4.0, 100.0, 0), 4.0);
    }
}
