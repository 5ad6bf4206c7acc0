pub mod batch;
pub mod dispatch;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod request_id;
pub mod stats;
pub mod strategy;

pub use batch::{BatchSettings, LegacyBatchProcessor};
pub use dispatch::{
    DispatchRequest, Dispatcher, PendingResponse, QueueMetricsSnapshot, QueueStatus, RequestInfo,
    RequestOptions, RequestStatus,
};
pub use events::{ConnectionState, ManagerEvent};
pub use manager::{BatchRequest, BatchResult, CallOptions, McpManager};
pub use protocol::{
    McpMethod, Priority, PromptArgument, PromptDescriptor, ResourceDescriptor, ToolDescriptor,
};
pub use queue::{QueueSettings, RequestQueue};
pub use registry::{
    ExecutionContext, ExecutionResult, RegisterOptions, RegistryStatistics, SyncReport, ToolFilter,
    ToolMetadata, ToolRegistry,
};
pub use request_id::RequestIdGenerator;
pub use stats::{ManagerStatistics, StatsCollector};
pub use strategy::{ErrorHandlingStrategy, ExponentialBackoffStrategy};
