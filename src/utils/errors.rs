use crate::core::protocol::{error_codes, JsonRpcError};
use serde_json::Value;
use thiserror::Error;

/// Coarse classification used by retry policies and callers that do not
/// want to branch on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection loss, network failure or timeout
    Transport,
    /// Well-formed rejection from the remote host
    Protocol,
    /// Rejected locally before reaching the transport
    Validation,
    /// Settled by `clear()` or `destroy()` of a dispatcher
    Cancelled,
    /// Any call after the manager was destroyed
    Destroyed,
    /// Configuration and local I/O problems
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Destroyed => write!(f, "destroyed"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum McpError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("protocol error {code}: {message}")]
    Protocol {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool disabled: {0}")]
    ToolDisabled(String),

    #[error("tool already registered: {0}")]
    ToolAlreadyRegistered(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("request queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("request queue cleared")]
    QueueCleared,

    #[error("request queue destroyed")]
    QueueDestroyed,

    #[error("manager destroyed")]
    ManagerDestroyed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<JsonRpcError> for McpError {
    fn from(e: JsonRpcError) -> Self {
        McpError::Protocol {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}

impl McpError {
    /// Build a protocol error from a JSON-RPC code and message
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        McpError::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::ConnectionLost(_) | Self::Io(_) => {
                ErrorKind::Transport
            }
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::ToolNotFound(_)
            | Self::ToolDisabled(_)
            | Self::ToolAlreadyRegistered(_)
            | Self::Validation(_)
            | Self::QueueFull(_) => ErrorKind::Validation,
            Self::QueueCleared | Self::QueueDestroyed => ErrorKind::Cancelled,
            Self::ManagerDestroyed => ErrorKind::Destroyed,
            Self::Config(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Transport-class failures and the JSON-RPC internal error subtype are
    /// worth another attempt. Connection loss is terminal for queued work.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Io(_) => true,
            Self::Protocol { code, .. } => *code == error_codes::INTERNAL_ERROR,
            _ => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConnectionLost(_) => "CONNECTION_LOST",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::ToolDisabled(_) => "TOOL_DISABLED",
            Self::ToolAlreadyRegistered(_) => "TOOL_ALREADY_REGISTERED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::QueueFull(_) => "QUEUE_FULL",
            Self::QueueCleared => "QUEUE_CLEARED",
            Self::QueueDestroyed => "QUEUE_DESTROYED",
            Self::ManagerDestroyed => "MANAGER_DESTROYED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(McpError::Timeout(100).kind(), ErrorKind::Transport);
        assert_eq!(
            McpError::ConnectionLost("gone".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            McpError::protocol(error_codes::METHOD_NOT_FOUND, "nope").kind(),
            ErrorKind::Protocol
        );
        assert_eq!(McpError::QueueFull(10).kind(), ErrorKind::Validation);
        assert_eq!(McpError::QueueCleared.kind(), ErrorKind::Cancelled);
        assert_eq!(McpError::ManagerDestroyed.kind(), ErrorKind::Destroyed);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(McpError::Transport("reset".into()).is_retryable());
        assert!(McpError::Timeout(30_000).is_retryable());
        assert!(McpError::protocol(error_codes::INTERNAL_ERROR, "boom").is_retryable());

        assert!(!McpError::protocol(error_codes::INVALID_PARAMS, "bad").is_retryable());
        assert!(!McpError::ConnectionLost("gone".into()).is_retryable());
        assert!(!McpError::ToolDisabled("echo".into()).is_retryable());
        assert!(!McpError::QueueFull(1).is_retryable());
    }

    #[test]
    fn test_from_json_rpc_error() {
        let err: McpError = JsonRpcError {
            code: error_codes::INVALID_PARAMS,
            message: "missing field".to_string(),
            data: None,
        }
        .into();

        assert_eq!(err.error_code(), "PROTOCOL_ERROR");
        assert_eq!(err.to_string(), "protocol error -32602: missing field");
    }
}
