//! Backend upstreams and round-robin selection

mod pool;

pub use pool::{BackendDescriptor, BackendPool};
