//! Queue port implementations.

pub mod memory;
pub mod tcp;

pub use memory::{MemorySink, MemorySource};
pub use tcp::{parse_endpoint, PortContext, TcpInputPort, TcpOutputPort};
