pub mod memory;
pub mod traits;

pub use memory::{MemoryTransport, RecordedCall};
pub use traits::{Transport, TransportEvent};

#[cfg(test)]
pub use traits::MockTransport;
