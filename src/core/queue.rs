//! Priority request queue
//!
//! Requests wait in a max-heap keyed by priority then submission order. A
//! scheduler task ticks every `process_interval` and moves requests from the
//! heap into flight while fewer than `max_concurrent` are active. Failed
//! attempts are re-queued after the strategy's backoff with their original
//! submission order, so a retried request does not lose its place among
//! peers of the same priority.

use crate::config::ManagerConfig;
use crate::core::dispatch::{
    call_with_timeout, DispatchRequest, Dispatcher, PendingResponse, QueueMetrics,
    QueueMetricsSnapshot, QueueStatus, QueuedRequest, RequestInfo, RequestOptions, RequestStatus,
};
use crate::core::protocol::{McpMethod, Priority};
use crate::core::request_id::RequestIdGenerator;
use crate::core::strategy::ErrorHandlingStrategy;
use crate::transport::Transport;
use crate::utils::errors::{McpError, McpResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue tuning taken from [`ManagerConfig`]
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_size: usize,
    pub max_concurrent: usize,
    pub process_interval: Duration,
    pub enable_priority: bool,
}

impl QueueSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            max_size: config.queue_max_size,
            max_concurrent: config.max_concurrent,
            process_interval: config.process_interval(),
            enable_priority: config.enable_priority,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&ManagerConfig::default())
    }
}

/// Heap entry: higher priority first, then lower sequence number
struct Prioritized(QueuedRequest);

impl Prioritized {
    fn key(&self) -> (Priority, Reverse<u64>) {
        (self.0.priority, Reverse(self.0.seq))
    }
}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Prioritized {}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key().cmp(&other.key())
    }
}

#[derive(Default)]
struct QueueState {
    pending: BinaryHeap<Prioritized>,
    active: HashMap<String, QueuedRequest>,
    retrying: HashMap<String, QueuedRequest>,
    next_seq: u64,
    destroyed: bool,
}

impl QueueState {
    fn queue_size(&self) -> usize {
        self.pending.len() + self.retrying.len()
    }
}

struct QueueInner {
    settings: QueueSettings,
    transport: Arc<dyn Transport>,
    strategy: Arc<dyn ErrorHandlingStrategy>,
    state: Mutex<QueueState>,
    queue_size: AtomicUsize,
    active_requests: AtomicUsize,
    ids: RequestIdGenerator,
    metrics: QueueMetrics,
    scheduler: Mutex<Option<CancellationToken>>,
}

/// Bounded, priority-ordered, concurrency-capped request queue
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    pub fn new(
        transport: Arc<dyn Transport>,
        strategy: Arc<dyn ErrorHandlingStrategy>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                settings,
                transport,
                strategy,
                state: Mutex::new(QueueState::default()),
                queue_size: AtomicUsize::new(0),
                active_requests: AtomicUsize::new(0),
                ids: RequestIdGenerator::with_prefix("queue"),
                metrics: QueueMetrics::default(),
                scheduler: Mutex::new(None),
            }),
        }
    }

    /// Admit a request and return its response future without awaiting it
    pub fn submit(
        &self,
        method: McpMethod,
        params: Value,
        options: RequestOptions,
    ) -> McpResult<PendingResponse> {
        self.inner
            .admit(DispatchRequest::new(method, params, options))
    }

    /// Submit and wait for the final result
    pub async fn enqueue(
        &self,
        method: McpMethod,
        params: Value,
        options: RequestOptions,
    ) -> McpResult<Value> {
        self.submit(method, params, options)?.await
    }

    /// Run one scheduler pass immediately
    pub fn process_once(&self) {
        self.inner.tick();
    }
}

impl QueueInner {
    fn admit(&self, request: DispatchRequest) -> McpResult<PendingResponse> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(McpError::QueueDestroyed);
        }

        if state.queue_size() >= self.settings.max_size {
            self.metrics.rejected.increment();
            warn!(
                "Request queue full ({} pending), rejecting {}",
                self.settings.max_size, request.method
            );
            return Err(McpError::QueueFull(self.settings.max_size));
        }

        let priority = if self.settings.enable_priority {
            request.options.priority
        } else {
            Priority::Normal
        };
        let seq = state.next_seq;
        state.next_seq += 1;

        let (entry, response) = QueuedRequest::new(
            self.ids.next_id(),
            seq,
            request,
            priority,
            self.strategy.as_ref(),
        );
        debug!(
            "Queued {} {} with {} priority",
            entry.id, entry.method, entry.priority
        );
        state.pending.push(Prioritized(entry));
        self.refresh_gauges(&state);

        Ok(response)
    }

    fn tick(self: &Arc<Self>) {
        let mut state = self.state.lock();
        while state.active.len() < self.settings.max_concurrent {
            let Some(Prioritized(mut request)) = state.pending.pop() else {
                break;
            };
            request.status = RequestStatus::Active;

            let id = request.id.clone();
            let method = request.method;
            let params = request.params.clone();
            let timeout = request.timeout;
            debug!(
                "Dispatching {} {} (attempt {})",
                id,
                method,
                request.retry_count + 1
            );
            state.active.insert(id.clone(), request);

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = call_with_timeout(
                    inner.transport.as_ref(),
                    method,
                    params,
                    timeout,
                    &inner.metrics,
                )
                .await;
                inner.complete(&id, outcome);
            });
        }
        self.refresh_gauges(&state);
    }

    fn complete(self: &Arc<Self>, id: &str, outcome: McpResult<Value>) {
        let mut state = self.state.lock();
        let Some(mut request) = state.active.remove(id) else {
            // Cleared while in flight
            self.metrics.discarded.increment();
            debug!("Discarding late result for {}", id);
            return;
        };

        match outcome {
            Ok(value) => {
                self.metrics.processed.increment();
                debug!("Request {} completed", id);
                request.settle(Ok(value));
            }
            Err(error) => match request.plan_retry(self.strategy.as_ref(), error) {
                Ok(delay) => {
                    self.metrics.retried.increment();
                    warn!(
                        "Request {} failed, retry {}/{} in {:?}",
                        id, request.retry_count, request.max_retries, delay
                    );
                    state.retrying.insert(id.to_string(), request);

                    let inner = Arc::clone(self);
                    let id = id.to_string();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        inner.requeue(&id);
                    });
                }
                Err(error) => {
                    self.metrics.failed.increment();
                    warn!("Request {} failed: {}", id, error);
                    request.settle(Err(error));
                }
            },
        }
        self.refresh_gauges(&state);
    }

    fn requeue(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(mut request) = state.retrying.remove(id) {
            request.status = RequestStatus::Pending;
            state.pending.push(Prioritized(request));
            self.refresh_gauges(&state);
        }
    }

    fn reject_all(&self, make_error: &dyn Fn() -> McpError) -> usize {
        let mut state = self.state.lock();
        let mut settled = 0;

        for Prioritized(request) in state.pending.drain() {
            request.settle(Err(make_error()));
            settled += 1;
        }
        for (_, request) in state.active.drain() {
            request.settle(Err(make_error()));
            settled += 1;
        }
        for (_, request) in state.retrying.drain() {
            request.settle(Err(make_error()));
            settled += 1;
        }

        self.refresh_gauges(&state);
        settled
    }

    fn refresh_gauges(&self, state: &QueueState) {
        self.queue_size.store(state.queue_size(), Ordering::SeqCst);
        self.active_requests
            .store(state.active.len(), Ordering::SeqCst);
    }
}

impl Dispatcher for RequestQueue {
    fn name(&self) -> &'static str {
        "request-queue"
    }

    fn submit(&self, request: DispatchRequest) -> McpResult<PendingResponse> {
        self.inner.admit(request)
    }

    fn start(&self) {
        let mut scheduler = self.inner.scheduler.lock();
        if scheduler.is_some() || self.inner.state.lock().destroyed {
            return;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.settings.process_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => inner.tick(),
                }
            }
            debug!("Request queue scheduler stopped");
        });

        info!(
            "Request queue started (max_concurrent={}, interval={:?})",
            self.inner.settings.max_concurrent, self.inner.settings.process_interval
        );
        *scheduler = Some(token);
    }

    fn stop(&self) {
        if let Some(token) = self.inner.scheduler.lock().take() {
            token.cancel();
        }
    }

    fn is_running(&self) -> bool {
        self.inner.scheduler.lock().is_some()
    }

    fn status(&self) -> QueueStatus {
        QueueStatus {
            queue_size: self.inner.queue_size.load(Ordering::SeqCst),
            active_requests: self.inner.active_requests.load(Ordering::SeqCst),
        }
    }

    fn metrics(&self) -> QueueMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    fn requests(&self) -> Vec<RequestInfo> {
        let state = self.inner.state.lock();
        let mut infos: Vec<RequestInfo> = state
            .active
            .values()
            .chain(state.retrying.values())
            .chain(state.pending.iter().map(|p| &p.0))
            .map(QueuedRequest::info)
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    fn reject_all(&self, make_error: &dyn Fn() -> McpError) -> usize {
        let settled = self.inner.reject_all(make_error);
        if settled > 0 {
            info!("Request queue rejected {} outstanding requests", settled);
        }
        settled
    }

    fn destroy(&self) {
        self.stop();
        self.inner.state.lock().destroyed = true;
        self.inner.reject_all(&|| McpError::QueueCleared);
        info!("Request queue destroyed");
    }
}
