//! Memory system interface.
//!
//! The scheduler only talks to the memory system through [`MemorySystem`]:
//! chunks are offered with [`MemorySystem::push_chunk`], and finished chunks are
//! reported back through a [`CompletionSink`] during [`MemorySystem::tick`].

// Imports
use {
	crate::{
		request::{ChunkId, OpKind, RequestId},
		Cycle,
	},
	std::collections::VecDeque,
};

/// A chunk offered to the memory system
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Chunk {
	/// Address
	pub addr: u64,

	/// Operation kind
	pub kind: OpKind,

	/// Id of the frontend that issued this chunk
	pub source_id: usize,

	/// Request this chunk belongs to
	pub request_id: RequestId,

	/// Chunk id
	pub chunk_id: ChunkId,

	/// Whether this was the last remaining chunk of the request when issued
	pub is_last: bool,
}

/// Memory system
pub trait MemorySystem {
	/// Offers a chunk to the memory system.
	///
	/// Returns `false` if the chunk wasn't accepted, in which case the caller
	/// must offer it again later.
	fn push_chunk(&mut self, chunk: Chunk) -> bool;

	/// Advances the memory system by a cycle, reporting finished chunks to `sink`
	fn tick(&mut self, sink: &mut dyn CompletionSink);
}

/// Receiver of chunk completions
pub trait CompletionSink {
	/// Signals that `chunk` has finished
	fn completion_signal(&mut self, chunk: &Chunk);
}

/// Memory configuration
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
	/// Cycles between accepting a chunk and finishing it
	pub latency: Cycle,

	/// Maximum chunks being serviced at once
	pub queue_capacity: usize,

	/// Maximum chunks accepted per cycle
	pub accepts_per_cycle: usize,
}

impl Default for MemoryConfig {
	fn default() -> Self {
		Self {
			latency:           20,
			queue_capacity:    32,
			accepts_per_cycle: 1,
		}
	}
}

/// Fixed-latency memory.
///
/// Every accepted chunk finishes `latency` cycles later, in the order it was accepted.
/// Only read completions are reported, writes are retired silently.
#[derive(Debug)]
pub struct FixedLatencyMemory {
	/// Config
	config: MemoryConfig,

	/// Current cycle
	cycle: Cycle,

	/// Chunks being serviced, with the cycle they finish on
	queue: VecDeque<(Cycle, Chunk)>,

	/// Chunks accepted during the current cycle
	accepted_this_cycle: usize,

	/// Statistics
	statistics: MemoryStatistics,
}

impl FixedLatencyMemory {
	/// Creates a new memory
	///
	/// # Panics
	/// Panics if `queue_capacity` or `accepts_per_cycle` are 0.
	pub fn new(config: MemoryConfig) -> Self {
		assert!(config.queue_capacity > 0, "Queue capacity must be > 0");
		assert!(config.accepts_per_cycle > 0, "Accepts per cycle must be > 0");

		Self {
			config,
			cycle: 0,
			queue: VecDeque::with_capacity(config.queue_capacity),
			accepted_this_cycle: 0,
			statistics: MemoryStatistics::default(),
		}
	}

	/// Returns the current cycle
	pub fn cycle(&self) -> Cycle {
		self.cycle
	}

	/// Returns the number of chunks being serviced
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	/// Returns the statistics
	pub fn statistics(&self) -> &MemoryStatistics {
		&self.statistics
	}
}

impl MemorySystem for FixedLatencyMemory {
	fn push_chunk(&mut self, chunk: Chunk) -> bool {
		if self.queue.len() >= self.config.queue_capacity || self.accepted_this_cycle >= self.config.accepts_per_cycle {
			self.statistics.rejected += 1;
			return false;
		}

		let ready_at = self.cycle.saturating_add(self.config.latency);
		tracing::trace!(?chunk, ready_at, "Accepted chunk");
		self.queue.push_back((ready_at, chunk));
		self.accepted_this_cycle += 1;

		true
	}

	fn tick(&mut self, sink: &mut dyn CompletionSink) {
		self.cycle += 1;
		self.accepted_this_cycle = 0;

		while let Some(&(ready_at, chunk)) = self.queue.front() {
			if ready_at > self.cycle {
				break;
			}
			self.queue.pop_front();

			match chunk.kind {
				OpKind::Read => {
					self.statistics.reads += 1;
					sink.completion_signal(&chunk);
				},
				OpKind::Write => self.statistics.writes += 1,
			}
		}
	}
}

/// Memory statistics
#[derive(Clone, Copy, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct MemoryStatistics {
	/// Read chunks serviced
	pub reads: u64,

	/// Write chunks serviced
	pub writes: u64,

	/// Chunks rejected
	pub rejected: u64,
}
