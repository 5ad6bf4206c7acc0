pub mod errors;
pub mod metrics;
pub mod tracing;

pub use errors::{ErrorKind, McpError, McpResult};
pub use metrics::AtomicCounter;
pub use self::tracing::init_tracing;
