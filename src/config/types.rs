use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct ManagerConfig {
    /// Pending requests accepted before `QUEUE_FULL` backpressure
    #[validate(range(min = 1))]
    pub queue_max_size: usize,
    /// Upper bound on requests in flight
    #[validate(range(min = 1))]
    pub max_concurrent: usize,
    /// Scheduler tick interval in milliseconds
    #[validate(range(min = 1))]
    pub process_interval_ms: u64,
    /// Per-request timeout in milliseconds
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
    /// Order pending requests by priority; FIFO otherwise
    pub enable_priority: bool,
    /// Use the request queue; the legacy batch processor otherwise
    pub enable_request_queue: bool,
    /// Gate tool calls on the local tool registry
    pub enable_tool_registry: bool,
    #[validate(nested)]
    pub batch: BatchConfig,
    #[validate(nested)]
    pub retry: RetryConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            queue_max_size: 1000,
            max_concurrent: 5,
            process_interval_ms: 50,
            request_timeout_ms: 30_000,
            enable_priority: true,
            enable_request_queue: true,
            enable_tool_registry: true,
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Legacy batch processor settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct BatchConfig {
    /// Items drained per tick
    #[validate(range(min = 1))]
    pub max_batch_size: usize,
    /// Tick interval in milliseconds
    #[validate(range(min = 1))]
    pub batch_timeout_ms: u64,
    /// Items of one batch executed concurrently
    #[validate(range(min = 1))]
    pub max_parallel: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            batch_timeout_ms: 100,
            max_parallel: 3,
        }
    }
}

impl BatchConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

/// Retry/backoff settings shared by both dispatch paths
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
    #[validate(range(min = 1))]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RegistryConfig {
    /// Re-enable an explicitly disabled tool when its remote descriptor changes
    pub reenable_on_descriptor_change: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
