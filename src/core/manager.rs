//! Client-side manager façade
//!
//! `McpManager` owns the transport lifecycle, the tool registry, the
//! resource/prompt mirror and one dispatcher. The dispatcher is the request
//! queue unless `enable_request_queue` is off, in which case the legacy batch
//! processor takes its place. Both share one retry strategy.
//!
//! Lifecycle: `disconnected -> initializing -> ready`, back to
//! `disconnected` when the transport drops. Every `ready` re-runs the full
//! startup sequence, so reconnects resync from scratch.

use crate::cache::{CacheMetricsSnapshot, CapabilityCache};
use crate::config::{ConfigValidator, ManagerConfig};
use crate::core::batch::{BatchSettings, LegacyBatchProcessor};
use crate::core::dispatch::{
    DispatchRequest, Dispatcher, QueueMetricsSnapshot, RequestInfo, RequestOptions,
};
use crate::core::events::{ConnectionState, ManagerEvent};
use crate::core::protocol::{McpMethod, PromptDescriptor, ResourceDescriptor};
use crate::core::queue::{QueueSettings, RequestQueue};
use crate::core::registry::{
    ExecutionContext, ExecutionResult, RegistryStatistics, ToolFilter, ToolMetadata, ToolRegistry,
};
use crate::core::stats::{ManagerStatistics, StatsCollector};
use crate::core::strategy::{ErrorHandlingStrategy, ExponentialBackoffStrategy};
use crate::transport::{Transport, TransportEvent};
use crate::utils::errors::{McpError, McpResult};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Options accepted by `call_tool`, `read_resource` and `get_prompt`
pub type CallOptions = RequestOptions;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One item of an `execute_batch` call
#[derive(Debug, Clone)]
pub enum BatchRequest {
    CallTool {
        name: String,
        arguments: Value,
        options: CallOptions,
    },
    ReadResource {
        uri: String,
        options: CallOptions,
    },
    GetPrompt {
        name: String,
        arguments: Value,
        options: CallOptions,
    },
}

impl BatchRequest {
    pub fn call_tool(name: impl Into<String>, arguments: Value) -> Self {
        Self::CallTool {
            name: name.into(),
            arguments,
            options: CallOptions::default(),
        }
    }

    pub fn read_resource(uri: impl Into<String>) -> Self {
        Self::ReadResource {
            uri: uri.into(),
            options: CallOptions::default(),
        }
    }

    pub fn get_prompt(name: impl Into<String>, arguments: Value) -> Self {
        Self::GetPrompt {
            name: name.into(),
            arguments,
            options: CallOptions::default(),
        }
    }

    pub fn with_options(mut self, new_options: CallOptions) -> Self {
        match &mut self {
            Self::CallTool { options, .. }
            | Self::ReadResource { options, .. }
            | Self::GetPrompt { options, .. } => *options = new_options,
        }
        self
    }
}

/// Settled outcome of one batch item, aligned with its request
#[derive(Debug)]
pub enum BatchResult {
    Success(Value),
    Failure(McpError),
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchResult::Success(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            BatchResult::Success(value) => Some(value),
            BatchResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&McpError> {
        match self {
            BatchResult::Success(_) => None,
            BatchResult::Failure(error) => Some(error),
        }
    }
}

impl From<McpResult<Value>> for BatchResult {
    fn from(result: McpResult<Value>) -> Self {
        match result {
            Ok(value) => BatchResult::Success(value),
            Err(error) => BatchResult::Failure(error),
        }
    }
}

struct ManagerInner {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Box<dyn Dispatcher>,
    registry: ToolRegistry,
    capabilities: CapabilityCache,
    stats: StatsCollector,
    state: RwLock<ConnectionState>,
    destroyed: AtomicBool,
    events: broadcast::Sender<ManagerEvent>,
    /// Serialises the ready/disconnect sequences
    lifecycle: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Public entry point for calling tools, reading resources and fetching
/// prompts over one transport
#[derive(Clone)]
pub struct McpManager {
    inner: Arc<ManagerInner>,
}

impl McpManager {
    /// Build a manager with the default exponential backoff strategy
    pub fn new(transport: Arc<dyn Transport>, config: ManagerConfig) -> McpResult<Self> {
        let strategy = Arc::new(ExponentialBackoffStrategy::new(
            &config.retry,
            config.request_timeout(),
        ));
        Self::with_strategy(transport, config, strategy)
    }

    pub fn with_strategy(
        transport: Arc<dyn Transport>,
        config: ManagerConfig,
        strategy: Arc<dyn ErrorHandlingStrategy>,
    ) -> McpResult<Self> {
        ConfigValidator::new().ensure_valid(&config)?;

        let dispatcher: Box<dyn Dispatcher> = if config.enable_request_queue {
            Box::new(RequestQueue::new(
                Arc::clone(&transport),
                strategy,
                QueueSettings::from_config(&config),
            ))
        } else {
            Box::new(LegacyBatchProcessor::new(
                Arc::clone(&transport),
                strategy,
                BatchSettings::from_config(&config),
            ))
        };
        info!("Manager using {} dispatcher", dispatcher.name());

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry =
            ToolRegistry::with_reenable_on_change(config.registry.reenable_on_descriptor_change);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                transport,
                dispatcher,
                registry,
                capabilities: CapabilityCache::new(),
                stats: StatsCollector::new(),
                state: RwLock::new(ConnectionState::Disconnected),
                destroyed: AtomicBool::new(false),
                events,
                lifecycle: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
                listener: Mutex::new(None),
            }),
        })
    }

    /// Subscribe to transport events and, if the transport is already
    /// ready, run the startup sequence now
    pub async fn start(&self) -> McpResult<()> {
        self.ensure_alive()?;

        {
            let mut listener = self.inner.listener.lock();
            if listener.is_some() {
                return Ok(());
            }
            let events = self.inner.transport.subscribe();
            *listener = Some(tokio::spawn(listen(
                Arc::downgrade(&self.inner),
                events,
                self.inner.shutdown.clone(),
            )));
        }

        if self.inner.transport.is_ready() {
            self.inner.on_ready().await;
        }
        Ok(())
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        options: CallOptions,
    ) -> McpResult<Value> {
        self.ensure_alive()?;

        let tool_id = if self.inner.config.enable_tool_registry {
            match self.inner.registry.ensure_callable(name) {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!("Rejecting call to '{}': {}", name, e);
                    self.inner.stats.record_failure(None, &e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let context = ExecutionContext::new(arguments.clone());
        let params = json!({ "name": name, "arguments": arguments });
        let (result, elapsed) = self
            .inner
            .dispatch(McpMethod::ToolsCall, params, options)
            .await;

        if let (Some(id), Some(elapsed)) = (tool_id, elapsed) {
            let execution = match &result {
                Ok(_) => ExecutionResult::success(elapsed),
                Err(e) => ExecutionResult::failure(elapsed, e.to_string()),
            };
            self.inner.registry.record_execution(&id, &context, &execution);
        }
        self.inner.emit(ManagerEvent::ToolExecuted {
            name: name.to_string(),
            success: result.is_ok(),
            duration_ms: elapsed.unwrap_or_default().as_millis() as u64,
        });

        result
    }

    pub async fn read_resource(&self, uri: &str, options: CallOptions) -> McpResult<Value> {
        self.ensure_alive()?;
        let (result, _) = self
            .inner
            .dispatch(McpMethod::ResourcesRead, json!({ "uri": uri }), options)
            .await;
        result
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Value,
        options: CallOptions,
    ) -> McpResult<Value> {
        self.ensure_alive()?;
        let params = json!({ "name": name, "arguments": arguments });
        let (result, _) = self
            .inner
            .dispatch(McpMethod::PromptsGet, params, options)
            .await;
        result
    }

    /// Run every request and settle all of them; results keep request order
    pub async fn execute_batch(&self, requests: Vec<BatchRequest>) -> McpResult<Vec<BatchResult>> {
        self.ensure_alive()?;
        debug!("Executing batch of {} requests", requests.len());

        let calls = requests.into_iter().map(|request| async move {
            let result = match request {
                BatchRequest::CallTool {
                    name,
                    arguments,
                    options,
                } => self.call_tool(&name, arguments, options).await,
                BatchRequest::ReadResource { uri, options } => {
                    self.read_resource(&uri, options).await
                }
                BatchRequest::GetPrompt {
                    name,
                    arguments,
                    options,
                } => self.get_prompt(&name, arguments, options).await,
            };
            BatchResult::from(result)
        });

        Ok(join_all(calls).await)
    }

    /// Cumulative counters merged with live gauges
    pub fn get_statistics(&self) -> ManagerStatistics {
        let status = self.inner.dispatcher.status();
        ManagerStatistics {
            queue_size: status.queue_size,
            active_requests: status.active_requests,
            tools_registered: self.inner.registry.len(),
            resources_available: self.inner.capabilities.resource_count(),
            prompts_available: self.inner.capabilities.prompt_count(),
            ..self.inner.stats.snapshot()
        }
    }

    pub fn get_registered_tools(&self) -> Vec<ToolMetadata> {
        self.inner.registry.list_tools()
    }

    pub fn find_tools(&self, filter: &ToolFilter) -> McpResult<Vec<ToolMetadata>> {
        self.inner.registry.find_tools(filter)
    }

    pub fn registry_statistics(&self) -> RegistryStatistics {
        self.inner.registry.get_registry_statistics()
    }

    /// Enable or disable a tool by name; false if the tool is unknown
    pub fn set_tool_enabled(&self, name: &str, enabled: bool) -> bool {
        self.inner.registry.set_tool_enabled_by_name(name, enabled)
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        self.inner.capabilities.resources()
    }

    pub fn prompts(&self) -> Vec<PromptDescriptor> {
        self.inner.capabilities.prompts()
    }

    /// Look up one advertised resource from the last sync
    pub fn resource(&self, uri: &str) -> Option<ResourceDescriptor> {
        self.inner.capabilities.resource(uri)
    }

    pub fn prompt(&self, name: &str) -> Option<PromptDescriptor> {
        self.inner.capabilities.prompt(name)
    }

    pub fn capability_metrics(&self) -> CacheMetricsSnapshot {
        self.inner.capabilities.metrics()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events.subscribe()
    }

    pub fn dispatcher_metrics(&self) -> QueueMetricsSnapshot {
        self.inner.dispatcher.metrics()
    }

    /// Requests still waiting, in flight or backing off
    pub fn pending_requests(&self) -> Vec<RequestInfo> {
        self.inner.dispatcher.requests()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Tear everything down. Later calls are no-ops and every other
    /// operation fails with `ManagerDestroyed`.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Destroying manager");

        self.inner.shutdown.cancel();
        let listener = self.inner.listener.lock().take();
        if let Some(handle) = listener {
            handle.abort();
        }

        self.inner.dispatcher.destroy();
        self.inner.registry.clear();
        self.inner.capabilities.clear();
        self.inner.stats.mark_disconnected();
        *self.inner.state.write() = ConnectionState::Disconnected;

        if let Err(e) = self.inner.transport.close().await {
            error!("Failed to close transport: {}", e);
        }
    }

    fn ensure_alive(&self) -> McpResult<()> {
        if self.is_destroyed() {
            return Err(McpError::ManagerDestroyed);
        }
        Ok(())
    }
}

impl ManagerInner {
    /// Submit through the dispatcher, wait for settlement and record it.
    /// The elapsed time is `None` when the dispatcher refused the request.
    async fn dispatch(
        &self,
        method: McpMethod,
        params: Value,
        options: CallOptions,
    ) -> (McpResult<Value>, Option<Duration>) {
        let started = Instant::now();
        let pending = match self
            .dispatcher
            .submit(DispatchRequest::new(method, params, options))
        {
            Ok(pending) => pending,
            Err(e) => {
                self.record_failure(None, &e);
                return (Err(e), None);
            }
        };

        let result = pending.await;
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => self.stats.record_success(elapsed),
            Err(e) => self.record_failure(Some(elapsed), e),
        }
        (result, Some(elapsed))
    }

    fn record_failure(&self, elapsed: Option<Duration>, error: &McpError) {
        if matches!(error, McpError::ManagerDestroyed) {
            return;
        }
        self.stats.record_failure(elapsed, error);
    }

    fn emit(&self, event: ManagerEvent) {
        debug!("Emitting {}", event.name());
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("Connection state {} -> {}", *current, state);
            *current = state;
        }
    }

    async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Ready => self.on_ready().await,
            TransportEvent::Disconnected { reason } => self.on_disconnected(reason).await,
            TransportEvent::Error { message } => {
                warn!("Transport error: {}", message);
                self.stats.record_error(message.clone());
                self.emit(ManagerEvent::Error { message });
            }
            TransportEvent::ToolsUpdated => {
                if self.config.enable_tool_registry {
                    self.sync_tools().await;
                }
            }
            TransportEvent::ResourcesUpdated => self.sync_resources().await,
            TransportEvent::PromptsUpdated => self.sync_prompts().await,
        }
    }

    async fn on_ready(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_destroyed() || *self.state.read() == ConnectionState::Ready {
            return;
        }

        info!("Transport ready, initializing");
        self.set_state(ConnectionState::Initializing);

        if self.config.enable_tool_registry {
            self.sync_tools().await;
        }
        self.sync_resources().await;
        self.sync_prompts().await;

        if self.is_destroyed() {
            debug!("Manager destroyed during startup, skipping ready");
            return;
        }
        self.dispatcher.start();
        self.stats.mark_connected();
        self.set_state(ConnectionState::Ready);
        info!(
            "Manager ready ({} tools, {} resources, {} prompts)",
            self.registry.len(),
            self.capabilities.resource_count(),
            self.capabilities.prompt_count()
        );
        self.emit(ManagerEvent::Ready);
    }

    async fn on_disconnected(&self, reason: String) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_destroyed() {
            return;
        }

        warn!("Transport disconnected: {}", reason);
        self.dispatcher.stop();
        let rejected = self
            .dispatcher
            .reject_all(&|| McpError::ConnectionLost(reason.clone()));
        if rejected > 0 {
            warn!("Rejected {} requests after connection loss", rejected);
        }
        self.stats.mark_disconnected();
        self.set_state(ConnectionState::Disconnected);
        self.emit(ManagerEvent::Disconnected { reason });
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // Each sync re-checks `destroyed` after its await so a listing that
    // resolves during `destroy` cannot refill the cleared mirrors.
    async fn sync_tools(&self) {
        let listing = self.transport.list_tools().await;
        if self.is_destroyed() {
            return;
        }
        match listing {
            Ok(tools) => {
                let report = self.registry.sync(tools);
                for name in report.registered {
                    if let Some(tool) = self.registry.get_tool_by_name(&name) {
                        self.emit(ManagerEvent::ToolRegistered { id: tool.id, name });
                    }
                }
                for name in report.removed {
                    self.emit(ManagerEvent::ToolRemoved { name });
                }
            }
            Err(e) => self.sync_failed("tools", e),
        }
    }

    async fn sync_resources(&self) {
        let listing = self.transport.list_resources().await;
        if self.is_destroyed() {
            return;
        }
        match listing {
            Ok(resources) => self.capabilities.replace_resources(resources),
            Err(e) => self.sync_failed("resources", e),
        }
    }

    async fn sync_prompts(&self) {
        let listing = self.transport.list_prompts().await;
        if self.is_destroyed() {
            return;
        }
        match listing {
            Ok(prompts) => self.capabilities.replace_prompts(prompts),
            Err(e) => self.sync_failed("prompts", e),
        }
    }

    fn sync_failed(&self, listing: &str, error: McpError) {
        let message = format!("Failed to sync {}: {}", listing, error);
        warn!("{}", message);
        self.stats.record_error(message.clone());
        self.emit(ManagerEvent::Error { message });
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.dispatcher.stop();
    }
}

/// Forward transport events to the manager until shutdown
async fn listen(
    manager: Weak<ManagerInner>,
    mut events: broadcast::Receiver<TransportEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        let Some(inner) = manager.upgrade() else {
            break;
        };
        match event {
            Ok(event) => inner.handle_event(event).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} transport events", skipped);
                if inner.transport.is_ready() {
                    inner.on_ready().await;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Transport event listener stopped");
}
