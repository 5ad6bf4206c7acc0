//! Dispatch interface shared by the request queue and the legacy batch path
//!
//! Both paths hold submitted work as [`QueuedRequest`] entries, settle them
//! through a oneshot continuation and consult the same
//! [`ErrorHandlingStrategy`] when an attempt fails. The manager selects one
//! implementation at construction and talks to it only through
//! [`Dispatcher`].

use crate::core::protocol::{McpMethod, Priority};
use crate::core::strategy::ErrorHandlingStrategy;
use crate::transport::Transport;
use crate::utils::errors::{McpError, McpResult};
use crate::utils::metrics::AtomicCounter;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Per-request options; unset fields fall back to the strategy defaults
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub priority: Priority,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub tags: Vec<String>,
}

impl RequestOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Unit of work handed to a dispatcher
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub method: McpMethod,
    pub params: Value,
    pub options: RequestOptions,
}

impl DispatchRequest {
    pub fn new(method: McpMethod, params: Value, options: RequestOptions) -> Self {
        Self {
            method,
            params,
            options,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Active,
    Retrying,
    Done,
    Failed,
}

/// Live gauges of a dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_size: usize,
    pub active_requests: usize,
}

/// Read-only view of an outstanding request
#[derive(Debug, Clone, Serialize)]
pub struct RequestInfo {
    pub id: String,
    pub method: McpMethod,
    pub priority: Priority,
    pub status: RequestStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub tags: Vec<String>,
    pub waited_ms: u64,
}

/// Cumulative dispatcher counters
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub processed: AtomicCounter,
    pub failed: AtomicCounter,
    pub retried: AtomicCounter,
    pub timed_out: AtomicCounter,
    pub rejected: AtomicCounter,
    pub discarded: AtomicCounter,
}

impl QueueMetrics {
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            processed: self.processed.get(),
            failed: self.failed.get(),
            retried: self.retried.get(),
            timed_out: self.timed_out.get(),
            rejected: self.rejected.get(),
            discarded: self.discarded.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueMetricsSnapshot {
    /// Requests settled successfully
    pub processed: u64,
    /// Requests settled with their final error
    pub failed: u64,
    /// Retry attempts scheduled
    pub retried: u64,
    /// Attempts that hit the per-request timeout
    pub timed_out: u64,
    /// Submissions refused because the queue was full
    pub rejected: u64,
    /// Transport results that arrived after their request was cleared
    pub discarded: u64,
}

/// Settles exactly once with the request's final result
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    rx: oneshot::Receiver<McpResult<Value>>,
}

impl PendingResponse {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingResponse {
    type Output = McpResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The dispatcher went away without settling
            Poll::Ready(Err(_)) => Poll::Ready(Err(McpError::QueueDestroyed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Submission and lifecycle surface shared by both dispatch paths
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Admit a request; fails immediately with `QueueFull` on backpressure
    fn submit(&self, request: DispatchRequest) -> McpResult<PendingResponse>;

    /// Start the periodic scheduler; no-op when already running
    fn start(&self);

    /// Stop the scheduler; outstanding requests stay queued
    fn stop(&self);

    fn is_running(&self) -> bool;

    fn status(&self) -> QueueStatus;

    fn metrics(&self) -> QueueMetricsSnapshot;

    fn requests(&self) -> Vec<RequestInfo>;

    /// Settle every pending, active and retrying request with an error
    fn reject_all(&self, make_error: &dyn Fn() -> McpError) -> usize;

    fn clear(&self) -> usize {
        self.reject_all(&|| McpError::QueueCleared)
    }

    /// Stop, clear and refuse further submissions
    fn destroy(&self);
}

/// Entry held by a dispatcher until it settles
#[derive(Debug)]
pub(crate) struct QueuedRequest {
    pub id: String,
    pub seq: u64,
    pub method: McpMethod,
    pub params: Value,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_count: u32,
    pub tags: Vec<String>,
    pub status: RequestStatus,
    responder: oneshot::Sender<McpResult<Value>>,
}

impl QueuedRequest {
    /// Build an entry and the response future tied to it
    pub fn new(
        id: String,
        seq: u64,
        request: DispatchRequest,
        priority: Priority,
        strategy: &dyn ErrorHandlingStrategy,
    ) -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        let DispatchRequest {
            method,
            params,
            options,
        } = request;

        let entry = Self {
            id: id.clone(),
            seq,
            method,
            params,
            priority,
            enqueued_at: Instant::now(),
            timeout: options.timeout.unwrap_or_else(|| strategy.timeout()),
            max_retries: options.max_retries.unwrap_or_else(|| strategy.max_retries()),
            retry_count: 0,
            tags: options.tags,
            status: RequestStatus::Pending,
            responder: tx,
        };

        (entry, PendingResponse { id, rx })
    }

    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            id: self.id.clone(),
            method: self.method,
            priority: self.priority,
            status: self.status,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            tags: self.tags.clone(),
            waited_ms: self.enqueued_at.elapsed().as_millis() as u64,
        }
    }

    /// Deliver the final result; a dropped receiver is ignored
    pub fn settle(mut self, result: McpResult<Value>) {
        self.status = if result.is_ok() {
            RequestStatus::Done
        } else {
            RequestStatus::Failed
        };
        let _ = self.responder.send(result);
    }

    /// Consult the strategy after a failed attempt. Returns the backoff
    /// delay when another attempt is due, or hands the error back.
    pub fn plan_retry(
        &mut self,
        strategy: &dyn ErrorHandlingStrategy,
        error: McpError,
    ) -> Result<Duration, McpError> {
        let attempt = self.retry_count + 1;
        if self.retry_count < self.max_retries && strategy.should_retry(&error, attempt) {
            self.retry_count = attempt;
            self.status = RequestStatus::Retrying;
            Ok(strategy.retry_delay(self.retry_count))
        } else {
            Err(error)
        }
    }
}

/// Issue one attempt, racing it against the request timeout
pub(crate) async fn call_with_timeout(
    transport: &dyn Transport,
    method: McpMethod,
    params: Value,
    timeout: Duration,
    metrics: &QueueMetrics,
) -> McpResult<Value> {
    match tokio::time::timeout(timeout, transport.call(method, params)).await {
        Ok(result) => result,
        Err(_) => {
            metrics.timed_out.increment();
            Err(McpError::Timeout(timeout.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::strategy::ExponentialBackoffStrategy;
    use serde_json::json;

    fn strategy() -> ExponentialBackoffStrategy {
        ExponentialBackoffStrategy {
            max_retries: 2,
            timeout: Duration::from_secs(1),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
        }
    }

    fn entry(options: RequestOptions) -> (QueuedRequest, PendingResponse) {
        let s = strategy();
        QueuedRequest::new(
            "req-1".to_string(),
            1,
            DispatchRequest::new(McpMethod::ToolsCall, json!({}), options),
            Priority::Normal,
            &s,
        )
    }

    #[test]
    fn test_options_fall_back_to_strategy() {
        let (request, _) = entry(RequestOptions::default());
        assert_eq!(request.timeout, Duration::from_secs(1));
        assert_eq!(request.max_retries, 2);

        let (request, _) = entry(
            RequestOptions::default()
                .with_timeout(Duration::from_millis(5))
                .with_max_retries(0)
                .with_tag("batch"),
        );
        assert_eq!(request.timeout, Duration::from_millis(5));
        assert_eq!(request.max_retries, 0);
        assert_eq!(request.tags, vec!["batch".to_string()]);
    }

    #[test]
    fn test_plan_retry_exhausts_budget() {
        let s = strategy();
        let (mut request, _) = entry(RequestOptions::default());

        assert_eq!(
            request.plan_retry(&s, McpError::Timeout(1)).unwrap(),
            Duration::from_millis(20)
        );
        assert_eq!(
            request.plan_retry(&s, McpError::Timeout(1)).unwrap(),
            Duration::from_millis(25)
        );
        assert!(matches!(
            request.plan_retry(&s, McpError::Timeout(1)),
            Err(McpError::Timeout(1))
        ));
        assert_eq!(request.retry_count, 2);
    }

    #[test]
    fn test_plan_retry_refuses_protocol_rejection() {
        let s = strategy();
        let (mut request, _) = entry(RequestOptions::default());
        let result = request.plan_retry(&s, McpError::protocol(-32602, "bad args"));
        assert!(matches!(result, Err(McpError::Protocol { code: -32602, .. })));
        assert_eq!(request.retry_count, 0);
    }

    #[tokio::test]
    async fn test_settle_resolves_pending_response() {
        let (request, pending) = entry(RequestOptions::default());
        assert_eq!(pending.id(), "req-1");
        request.settle(Ok(json!({"ok": true})));
        assert_eq!(pending.await.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_dropped_entry_reports_destroyed() {
        let (request, pending) = entry(RequestOptions::default());
        drop(request);
        assert!(matches!(pending.await, Err(McpError::QueueDestroyed)));
    }
}
