// # Job Store Implementations
//
// This module provides implementations of the JobStore trait for
// different persistence strategies. Both share the same queue semantics
// from `queue.rs`; they differ only in where the queue lives.

pub mod file;
pub mod memory;
pub(crate) mod queue;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;
pub use queue::DEFAULT_VISIBILITY_TIMEOUT;
