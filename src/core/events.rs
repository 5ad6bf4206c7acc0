//! Manager notifications and connection state

use serde::Serialize;
use std::fmt;

/// Manager lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Initializing,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Initializing => write!(f, "initializing"),
            ConnectionState::Ready => write!(f, "ready"),
        }
    }
}

/// Notification broadcast to subscribers of a manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ManagerEvent {
    Ready,
    Disconnected { reason: String },
    Error { message: String },
    ToolRegistered { id: String, name: String },
    ToolRemoved { name: String },
    ToolExecuted {
        name: String,
        success: bool,
        duration_ms: u64,
    },
}

impl ManagerEvent {
    /// Stable event name, e.g. `manager:tool-executed`
    pub fn name(&self) -> &'static str {
        match self {
            ManagerEvent::Ready => "manager:ready",
            ManagerEvent::Disconnected { .. } => "manager:disconnected",
            ManagerEvent::Error { .. } => "manager:error",
            ManagerEvent::ToolRegistered { .. } => "manager:tool-registered",
            ManagerEvent::ToolRemoved { .. } => "manager:tool-removed",
            ManagerEvent::ToolExecuted { .. } => "manager:tool-executed",
        }
    }
}
