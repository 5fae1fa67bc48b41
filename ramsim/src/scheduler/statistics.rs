//! Statistics

// Imports
use {
	crate::{request::OpKind, Cycle},
	average::{Estimate, Variance},
	itertools::MinMaxResult,
};

/// Statistics
#[derive(Clone, Debug)]
pub struct Statistics {
	/// Read chunks issued
	read_chunks: u64,

	/// Write chunks issued
	write_chunks: u64,

	/// Admissions rejected for lack of capacity
	admissions_rejected: u64,

	/// Chunks the memory system didn't accept
	chunks_rejected: u64,

	/// Times a completion callback refused a request
	callback_refusals: u64,

	/// Retired requests
	retired: u64,

	/// Latency of retired requests, from admission to retirement
	latency: Variance,

	/// Minimum and maximum latency of retired requests
	latency_bounds: MinMaxResult<Cycle>,
}

impl Statistics {
	/// Creates new, empty, statistics
	pub fn new() -> Self {
		Self {
			read_chunks:         0,
			write_chunks:        0,
			admissions_rejected: 0,
			chunks_rejected:     0,
			callback_refusals:   0,
			retired:             0,
			latency:             Variance::new(),
			latency_bounds:      MinMaxResult::NoElements,
		}
	}

	/// Registers an issued chunk
	pub fn register_chunk(&mut self, kind: OpKind) {
		match kind {
			OpKind::Read => self.read_chunks += 1,
			OpKind::Write => self.write_chunks += 1,
		}
	}

	/// Registers a rejected admission
	pub fn register_admission_rejected(&mut self) {
		self.admissions_rejected += 1;
	}

	/// Registers a chunk the memory system rejected
	pub fn register_chunk_rejected(&mut self) {
		self.chunks_rejected += 1;
	}

	/// Registers a completion callback refusing a request
	pub fn register_callback_refusal(&mut self) {
		self.callback_refusals += 1;
	}

	/// Registers a retired request
	pub fn register_retired(&mut self, latency: Cycle) {
		self.retired += 1;
		self.latency.add(latency as f64);
		self.latency_bounds = match self.latency_bounds {
			MinMaxResult::NoElements => MinMaxResult::OneElement(latency),
			MinMaxResult::OneElement(cur) => MinMaxResult::MinMax(cur.min(latency), cur.max(latency)),
			MinMaxResult::MinMax(min, max) => MinMaxResult::MinMax(min.min(latency), max.max(latency)),
		};
	}

	/// Returns the total chunks issued
	pub fn chunks_issued(&self) -> u64 {
		self.read_chunks + self.write_chunks
	}

	/// Returns the read chunks issued
	pub fn read_chunks(&self) -> u64 {
		self.read_chunks
	}

	/// Returns the write chunks issued
	pub fn write_chunks(&self) -> u64 {
		self.write_chunks
	}

	/// Returns the admissions rejected
	pub fn admissions_rejected(&self) -> u64 {
		self.admissions_rejected
	}

	/// Returns the chunks rejected by the memory system
	pub fn chunks_rejected(&self) -> u64 {
		self.chunks_rejected
	}

	/// Returns the completion callback refusals
	pub fn callback_refusals(&self) -> u64 {
		self.callback_refusals
	}

	/// Returns the number of retired requests
	pub fn retired(&self) -> u64 {
		self.retired
	}

	/// Returns a summary of the latencies, if any request retired
	pub fn latency_summary(&self) -> Option<LatencySummary> {
		let (min, max) = self.latency_bounds.clone().into_option()?;

		Some(LatencySummary {
			mean: self.latency.mean(),
			error: self.latency.error(),
			min,
			max,
		})
	}
}

impl Default for Statistics {
	fn default() -> Self {
		Self::new()
	}
}

/// Latency summary
#[derive(Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct LatencySummary {
	/// Mean
	pub mean: f64,

	/// Standard error of the mean
	pub error: f64,

	/// Minimum
	pub min: Cycle,

	/// Maximum
	pub max: Cycle,
}
