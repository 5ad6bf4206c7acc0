//! mcp-dispatch: client-side request orchestration for MCP hosts
//!
//! A priority request queue with bounded concurrency, timeouts and retry,
//! a synchronized tool registry, and a manager façade tying both to a
//! transport lifecycle.

pub mod cache;
pub mod config;
pub mod core;
pub mod transport;
pub mod utils;

pub use config::ManagerConfig;
pub use core::{BatchRequest, BatchResult, CallOptions, McpManager};
pub use utils::errors::{McpError, McpResult};
