//! Global request statistics kept by the manager

use crate::utils::errors::McpError;
use crate::utils::metrics::running_mean;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Running mean over dispatched requests, in milliseconds
    pub average_response_time: f64,
    pub queue_size: usize,
    pub active_requests: usize,
    pub tools_registered: usize,
    pub resources_available: usize,
    pub prompts_available: usize,
    /// Time spent in the ready state across all connections, in milliseconds
    pub connection_uptime: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    timed_samples: u64,
    average_ms: f64,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
    uptime: Duration,
    connected_since: Option<Instant>,
}

impl Counters {
    fn sample(&mut self, elapsed: Duration) {
        self.timed_samples += 1;
        self.average_ms = running_mean(
            self.average_ms,
            elapsed.as_secs_f64() * 1000.0,
            self.timed_samples,
        );
    }

    fn uptime(&self) -> Duration {
        self.uptime
            + self
                .connected_since
                .map(|since| since.elapsed())
                .unwrap_or_default()
    }
}

/// Cumulative counters; every update happens under one short lock so
/// snapshots are consistent
#[derive(Default)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed: Duration) {
        let mut c = self.counters.lock();
        c.total += 1;
        c.successful += 1;
        c.sample(elapsed);
    }

    /// Record a settled failure. `elapsed` is `None` for requests rejected
    /// before dispatch, which do not contribute to the response time mean.
    pub fn record_failure(&self, elapsed: Option<Duration>, error: &McpError) {
        let mut c = self.counters.lock();
        c.total += 1;
        c.failed += 1;
        if let Some(elapsed) = elapsed {
            c.sample(elapsed);
        }
        c.last_error = Some(error.to_string());
        c.last_error_time = Some(Utc::now());
    }

    /// Note an error that did not belong to a request
    pub fn record_error(&self, message: impl Into<String>) {
        let mut c = self.counters.lock();
        c.last_error = Some(message.into());
        c.last_error_time = Some(Utc::now());
    }

    pub fn mark_connected(&self) {
        let mut c = self.counters.lock();
        if c.connected_since.is_none() {
            c.connected_since = Some(Instant::now());
        }
    }

    pub fn mark_disconnected(&self) {
        let mut c = self.counters.lock();
        if let Some(since) = c.connected_since.take() {
            c.uptime += since.elapsed();
        }
    }

    pub fn connection_uptime(&self) -> Duration {
        self.counters.lock().uptime()
    }

    /// Counter part of the snapshot; gauges are filled in by the caller
    pub fn snapshot(&self) -> ManagerStatistics {
        let c = self.counters.lock();
        ManagerStatistics {
            total_requests: c.total,
            successful_requests: c.successful,
            failed_requests: c.failed,
            average_response_time: c.average_ms,
            connection_uptime: c.uptime().as_millis() as u64,
            last_error: c.last_error.clone(),
            last_error_time: c.last_error_time,
            ..ManagerStatistics::default()
        }
    }
}
