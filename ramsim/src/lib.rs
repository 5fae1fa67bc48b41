//! Dependency-aware memory request scheduler (`ramsim`)
//!
//! Models fine-grained memory accesses with dependencies between them being
//! admitted, split into chunks and issued, cycle by cycle, to a memory system.

// Modules
pub mod config;
pub mod data;
pub mod driver;
pub mod memcpy;
pub mod memory;
pub mod request;
pub mod scheduler;
pub mod sim;
pub mod trace;

// Exports
pub use self::{
	config::Config,
	driver::TraceDriver,
	memcpy::MemCpyDriver,
	memory::{Chunk, CompletionSink, FixedLatencyMemory, MemorySystem},
	request::{OpKind, Request},
	scheduler::{Scheduler, SchedulerConfig},
	sim::{Frontend, Simulator},
	trace::{TraceReader, TraceWriter},
};

/// Cycle
pub type Cycle = u64;
