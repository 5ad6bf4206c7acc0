//! In-process transport
//!
//! Serves tool, resource and prompt listings from memory and answers calls
//! through a pluggable handler. Useful for embedding a host in the same
//! process and for exercising the manager without a wire protocol.

use crate::core::protocol::{McpMethod, PromptDescriptor, ResourceDescriptor, ToolDescriptor};
use crate::transport::traits::{Transport, TransportEvent};
use crate::utils::errors::{McpError, McpResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

type CallHandler = Arc<dyn Fn(McpMethod, Value) -> BoxFuture<'static, McpResult<Value>> + Send + Sync>;

/// A call observed by the transport
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: McpMethod,
    pub params: Value,
    pub at: Instant,
}

pub struct MemoryTransport {
    connected: AtomicBool,
    ready: AtomicBool,
    tools: RwLock<Vec<ToolDescriptor>>,
    resources: RwLock<Vec<ResourceDescriptor>>,
    prompts: RwLock<Vec<PromptDescriptor>>,
    fail_listing: AtomicBool,
    listing_delay: Mutex<Duration>,
    handler: RwLock<CallHandler>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    close_calls: AtomicUsize,
    events: broadcast::Sender<TransportEvent>,
}

/// Decrements the in-flight gauge even when the call future is dropped
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryTransport {
    /// Create a disconnected transport whose handler echoes every call
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        let handler: CallHandler = Arc::new(|method: McpMethod, params: Value| {
            async move { Ok::<Value, McpError>(json!({ "method": method.as_str(), "params": params })) }
                .boxed()
        });

        Self {
            connected: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            tools: RwLock::new(Vec::new()),
            resources: RwLock::new(Vec::new()),
            prompts: RwLock::new(Vec::new()),
            fail_listing: AtomicBool::new(false),
            listing_delay: Mutex::new(Duration::ZERO),
            handler: RwLock::new(handler),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            events,
        }
    }

    /// Replace the call handler
    pub fn on_call<F, Fut>(&self, handler: F)
    where
        F: Fn(McpMethod, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Value>> + Send + 'static,
    {
        let handler: CallHandler =
            Arc::new(move |method: McpMethod, params: Value| handler(method, params).boxed());
        *self.handler.write() = handler;
    }

    pub fn set_tools(&self, tools: Vec<ToolDescriptor>) {
        *self.tools.write() = tools;
    }

    pub fn set_resources(&self, resources: Vec<ResourceDescriptor>) {
        *self.resources.write() = resources;
    }

    pub fn set_prompts(&self, prompts: Vec<PromptDescriptor>) {
        *self.prompts.write() = prompts;
    }

    /// Make every `list_*` call fail with a transport error
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Delay every listing by `delay` before it answers
    pub fn set_listing_delay(&self, delay: Duration) {
        *self.listing_delay.lock() = delay;
    }

    /// Mark the transport connected and ready, then emit `Ready`
    pub fn set_ready(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Ready);
    }

    /// Drop the connection and emit `Disconnected`
    pub fn disconnect(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Disconnected {
            reason: reason.into(),
        });
    }

    pub fn emit(&self, event: TransportEvent) {
        debug!("Memory transport emitting {:?}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls observed for one method
    pub fn calls_for(&self, method: McpMethod) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Highest number of calls that were in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    async fn check_listing(&self) -> McpResult<()> {
        let delay = *self.listing_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(McpError::Transport("listing unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn call(&self, method: McpMethod, params: Value) -> McpResult<Value> {
        if !self.is_connected() {
            return Err(McpError::Transport("Transport not connected".to_string()));
        }

        self.calls.lock().push(RecordedCall {
            method,
            params: params.clone(),
            at: Instant::now(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let handler = self.handler.read().clone();
        handler(method, params).await
    }

    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        self.check_listing().await?;
        Ok(self.tools.read().clone())
    }

    async fn list_resources(&self) -> McpResult<Vec<ResourceDescriptor>> {
        self.check_listing().await?;
        Ok(self.resources.read().clone())
    }

    async fn list_prompts(&self) -> McpResult<Vec<PromptDescriptor>> {
        self.check_listing().await?;
        Ok(self.prompts.read().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> McpResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}
