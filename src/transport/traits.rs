use crate::core::protocol::{McpMethod, PromptDescriptor, ResourceDescriptor, ToolDescriptor};
use crate::utils::errors::McpResult;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Lifecycle and change notifications emitted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake complete, requests may flow
    Ready,
    /// Connection dropped; the transport owns reconnection
    Disconnected { reason: String },
    /// Non-fatal transport error
    Error { message: String },
    ToolsUpdated,
    ResourcesUpdated,
    PromptsUpdated,
}

/// Transport for MCP communication
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Check if transport is connected
    fn is_connected(&self) -> bool;

    /// Check if the handshake has completed
    fn is_ready(&self) -> bool;

    /// Issue a request and wait for its result. Remote rejections surface as
    /// `McpError::Protocol` carrying the JSON-RPC error code.
    async fn call(&self, method: McpMethod, params: Value) -> McpResult<Value>;

    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>>;

    async fn list_resources(&self) -> McpResult<Vec<ResourceDescriptor>>;

    async fn list_prompts(&self) -> McpResult<Vec<PromptDescriptor>>;

    /// Subscribe to lifecycle events; dropping the receiver unsubscribes
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Close the transport
    async fn close(&self) -> McpResult<()>;
}
