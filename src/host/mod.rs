//! Host adapters shipped with the engine.
//!
//! - [`MemoryHost`] - an in-memory node tree that records every mutation.
//!   Used by tests and as a reference for writing real adapters.

mod memory;

pub use memory::{MemoryHost, MemoryNode, NodeKind, RecordedOp};
