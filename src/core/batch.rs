//! Legacy batch processor
//!
//! Dispatch path used when the request queue is disabled. Requests wait in
//! FIFO order; every `batch_timeout` the processor drains up to
//! `max_batch_size` of them and runs that batch with at most `max_parallel`
//! calls in flight. The next batch starts only once the previous one has
//! finished, or was abandoned by `clear`, `reject_all` or `destroy`.
//! Failures go through the same retry strategy as the queue and retried
//! requests rejoin the back of the line.

use crate::config::ManagerConfig;
use crate::core::dispatch::{
    call_with_timeout, DispatchRequest, Dispatcher, PendingResponse, QueueMetrics,
    QueueMetricsSnapshot, QueueStatus, QueuedRequest, RequestInfo, RequestStatus,
};
use crate::core::protocol::McpMethod;
use crate::core::request_id::RequestIdGenerator;
use crate::core::strategy::ErrorHandlingStrategy;
use crate::transport::Transport;
use crate::utils::errors::{McpError, McpResult};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub max_size: usize,
    pub max_batch_size: usize,
    pub max_parallel: usize,
    pub batch_interval: Duration,
}

impl BatchSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            max_size: config.queue_max_size,
            max_batch_size: config.batch.max_batch_size,
            max_parallel: config.batch.max_parallel,
            batch_interval: config.batch.batch_timeout(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from_config(&ManagerConfig::default())
    }
}

/// The batch currently being executed
struct RunningBatch {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct BatchState {
    pending: VecDeque<QueuedRequest>,
    active: HashMap<String, QueuedRequest>,
    retrying: HashMap<String, QueuedRequest>,
    running: Option<RunningBatch>,
    next_generation: u64,
    next_seq: u64,
    destroyed: bool,
}

impl BatchState {
    fn queue_size(&self) -> usize {
        self.pending.len() + self.retrying.len()
    }
}

struct BatchInner {
    settings: BatchSettings,
    transport: Arc<dyn Transport>,
    strategy: Arc<dyn ErrorHandlingStrategy>,
    state: Mutex<BatchState>,
    queue_size: AtomicUsize,
    active_requests: AtomicUsize,
    ids: RequestIdGenerator,
    metrics: QueueMetrics,
    timer: Mutex<Option<CancellationToken>>,
}

/// FIFO batch dispatcher
#[derive(Clone)]
pub struct LegacyBatchProcessor {
    inner: Arc<BatchInner>,
}

impl LegacyBatchProcessor {
    pub fn new(
        transport: Arc<dyn Transport>,
        strategy: Arc<dyn ErrorHandlingStrategy>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                settings,
                transport,
                strategy,
                state: Mutex::new(BatchState::default()),
                queue_size: AtomicUsize::new(0),
                active_requests: AtomicUsize::new(0),
                ids: RequestIdGenerator::with_prefix("batch"),
                metrics: QueueMetrics::default(),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Drain and run one batch immediately, if none is in flight
    pub fn process_once(&self) {
        self.inner.tick();
    }
}

impl BatchInner {
    fn admit(&self, request: DispatchRequest) -> McpResult<PendingResponse> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(McpError::QueueDestroyed);
        }
        if state.queue_size() >= self.settings.max_size {
            self.metrics.rejected.increment();
            warn!("Batch queue full, rejecting {}", request.method);
            return Err(McpError::QueueFull(self.settings.max_size));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let priority = request.options.priority;
        let (entry, response) = QueuedRequest::new(
            self.ids.next_id(),
            seq,
            request,
            priority,
            self.strategy.as_ref(),
        );
        debug!("Batched {} {}", entry.id, entry.method);
        state.pending.push_back(entry);
        self.refresh_gauges(&state);

        Ok(response)
    }

    fn tick(self: &Arc<Self>) {
        let (batch, generation, cancel) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.running.is_some() || state.pending.is_empty() {
                return;
            }

            let take = state.pending.len().min(self.settings.max_batch_size);
            let mut batch: Vec<(String, McpMethod, Value, Duration)> = Vec::with_capacity(take);
            for mut request in state.pending.drain(..take) {
                request.status = RequestStatus::Active;
                batch.push((
                    request.id.clone(),
                    request.method,
                    request.params.clone(),
                    request.timeout,
                ));
                state.active.insert(request.id.clone(), request);
            }

            let generation = state.next_generation;
            state.next_generation += 1;
            let cancel = CancellationToken::new();
            state.running = Some(RunningBatch {
                generation,
                cancel: cancel.clone(),
            });
            self.refresh_gauges(state);
            (batch, generation, cancel)
        };

        debug!("Processing batch {} of {} requests", generation, batch.len());
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let parallel = inner.settings.max_parallel.max(1);
            let run = stream::iter(batch)
                .map(|(id, method, params, timeout)| {
                    let inner = Arc::clone(&inner);
                    async move {
                        let outcome = call_with_timeout(
                            inner.transport.as_ref(),
                            method,
                            params,
                            timeout,
                            &inner.metrics,
                        )
                        .await;
                        inner.complete(&id, outcome);
                    }
                })
                .buffer_unordered(parallel)
                .collect::<Vec<()>>();

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Batch {} abandoned", generation);
                }
                _ = run => {}
            }
            inner.finish_batch(generation);
        });
    }

    /// Release the batch slot, unless a newer batch already holds it
    fn finish_batch(&self, generation: u64) {
        let mut state = self.state.lock();
        if state
            .running
            .as_ref()
            .is_some_and(|running| running.generation == generation)
        {
            state.running = None;
        }
    }

    fn complete(self: &Arc<Self>, id: &str, outcome: McpResult<Value>) {
        let mut state = self.state.lock();
        let Some(mut request) = state.active.remove(id) else {
            self.metrics.discarded.increment();
            debug!("Discarding late batch result for {}", id);
            return;
        };

        match outcome {
            Ok(value) => {
                self.metrics.processed.increment();
                request.settle(Ok(value));
            }
            Err(error) => match request.plan_retry(self.strategy.as_ref(), error) {
                Ok(delay) => {
                    self.metrics.retried.increment();
                    warn!(
                        "Batch request {} failed, retry {}/{} in {:?}",
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
                    warn!("Batch request {} failed: {}", id, error);
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
            state.pending.push_back(request);
            self.refresh_gauges(&state);
        }
    }

    fn reject_all(&self, make_error: &dyn Fn() -> McpError) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        // In-flight calls of the current batch have nowhere to deliver to
        if let Some(running) = state.running.take() {
            running.cancel.cancel();
            self.metrics.discarded.add(state.active.len() as u64);
        }
        let drained: Vec<QueuedRequest> = state
            .pending
            .drain(..)
            .chain(state.active.drain().map(|(_, r)| r))
            .collect();
        let mut settled = drained.len();
        for request in drained {
            request.settle(Err(make_error()));
        }
        for (_, request) in state.retrying.drain() {
            request.settle(Err(make_error()));
            settled += 1;
        }
        self.refresh_gauges(state);
        settled
    }

    fn refresh_gauges(&self, state: &BatchState) {
        self.queue_size.store(state.queue_size(), Ordering::SeqCst);
        self.active_requests
            .store(state.active.len(), Ordering::SeqCst);
    }
}

impl Dispatcher for LegacyBatchProcessor {
    fn name(&self) -> &'static str {
        "legacy-batch"
    }

    fn submit(&self, request: DispatchRequest) -> McpResult<PendingResponse> {
        self.inner.admit(request)
    }

    fn start(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.is_some() || self.inner.state.lock().destroyed {
            return;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.settings.batch_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => inner.tick(),
                }
            }
            debug!("Batch timer stopped");
        });

        info!(
            "Legacy batch processor started (batch={}, parallel={})",
            self.inner.settings.max_batch_size, self.inner.settings.max_parallel
        );
        *timer = Some(token);
    }

    fn stop(&self) {
        if let Some(token) = self.inner.timer.lock().take() {
            token.cancel();
        }
    }

    fn is_running(&self) -> bool {
        self.inner.timer.lock().is_some()
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
        state
            .pending
            .iter()
            .chain(state.active.values())
            .chain(state.retrying.values())
            .map(QueuedRequest::info)
            .collect()
    }

    fn reject_all(&self, make_error: &dyn Fn() -> McpError) -> usize {
        let settled = self.inner.reject_all(make_error);
        if settled > 0 {
            info!("Batch processor rejected {} outstanding requests", settled);
        }
        settled
    }

    fn destroy(&self) {
        self.stop();
        self.inner.state.lock().destroyed = true;
        self.inner.reject_all(&|| McpError::QueueCleared);
        info!("Legacy batch processor destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::RequestOptions;
    use crate::core::strategy::ExponentialBackoffStrategy;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn processor(
        transport: Arc<MemoryTransport>,
        max_batch_size: usize,
        max_parallel: usize,
        max_retries: u32,
    ) -> LegacyBatchProcessor {
        let strategy = Arc::new(ExponentialBackoffStrategy {
            max_retries,
            timeout: Duration::from_secs(1),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        });
        LegacyBatchProcessor::new(
            transport,
            strategy,
            BatchSettings {
                max_size: 100,
                max_batch_size,
                max_parallel,
                batch_interval: Duration::from_millis(20),
            },
        )
    }

    fn request(n: usize) -> DispatchRequest {
        DispatchRequest::new(McpMethod::ToolsCall, json!({"n": n}), RequestOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_in_fifo_order_with_parallel_cap() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_ready();
        transport.on_call(|_, params| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, McpError>(params)
        });
        let batch = processor(transport.clone(), 4, 2, 0);

        let pending: Vec<_> = (0..6).map(|n| batch.submit(request(n)).unwrap()).collect();
        batch.start();
        let results = futures::future::join_all(pending).await;

        for (n, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap()["n"], n);
        }
        assert_eq!(transport.max_in_flight(), 2);
        let first_two: Vec<_> = transport.calls()[..2]
            .iter()
            .map(|c| c.params["n"].as_u64().unwrap_or(99))
            .collect();
        assert!(first_two.iter().all(|n| *n < 2));
        batch.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tick_drains_at_most_one_batch() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_ready();
        let batch = processor(transport.clone(), 3, 3, 0);

        let pending: Vec<_> = (0..5).map(|n| batch.submit(request(n)).unwrap()).collect();
        batch.process_once();
        assert_eq!(batch.status().queue_size, 2);
        assert_eq!(batch.status().active_requests, 3);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.call_count(), 3);

        batch.process_once();
        futures::future::join_all(pending).await;
        assert_eq!(transport.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_use_shared_strategy() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_ready();
        transport.on_call(|_, _| async {
            Err::<Value, _>(McpError::Transport("down".to_string()))
        });
        let batch = processor(transport.clone(), 10, 2, 2);
        batch.start();

        let result = batch.submit(request(0)).unwrap().await;
        assert!(matches!(result, Err(McpError::Transport(_))));
        assert_eq!(transport.call_count(), 3);
        assert_eq!(batch.metrics().retried, 2);
        batch.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_resumes_after_reject_all() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_ready();
        transport.on_call(|_, params| async move {
            if params["n"] == 0 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok::<_, McpError>(params)
        });
        let batch = processor(transport.clone(), 10, 2, 0);
        batch.start();

        let hung = batch.submit(request(0)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.call_count(), 1);

        batch.reject_all(&|| McpError::ConnectionLost("gone".to_string()));
        assert!(matches!(hung.await, Err(McpError::ConnectionLost(_))));

        let started = tokio::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(1), batch.submit(request(1)).unwrap())
            .await
            .expect("second request stuck behind the abandoned batch");
        assert_eq!(result.unwrap()["n"], 1);
        assert!(started.elapsed() <= Duration::from_millis(100));
        assert_eq!(batch.metrics().discarded, 1);
        batch.destroy();
    }

    #[tokio::test]
    async fn test_reject_all_settles_everything() {
        let transport = Arc::new(MemoryTransport::new());
        let batch = processor(transport, 10, 2, 0);

        let pending: Vec<_> = (0..4).map(|n| batch.submit(request(n)).unwrap()).collect();
        let settled = batch.reject_all(&|| McpError::ConnectionLost("gone".to_string()));
        assert_eq!(settled, 4);

        for result in futures::future::join_all(pending).await {
            assert!(matches!(result, Err(McpError::ConnectionLost(_))));
        }
        assert_eq!(batch.status(), QueueStatus::default());
    }
}
