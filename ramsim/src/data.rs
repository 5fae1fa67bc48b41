//! Output data

// Imports
use crate::{
	memory::MemoryStatistics,
	scheduler::{statistics::LatencySummary, Statistics},
	sim::RunOutput,
	Cycle,
};

/// Output data
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Data {
	pub cycles:        Cycle,
	pub memory_cycles: Cycle,
	pub scheduler:     SchedulerData,
	pub memory:        MemoryStatistics,
}

impl Data {
	/// Collects the output of a run
	pub fn new(output: &RunOutput, memory: MemoryStatistics) -> Self {
		Self {
			cycles: output.cycles,
			memory_cycles: output.memory_cycles,
			scheduler: SchedulerData::new(&output.statistics),
			memory,
		}
	}
}

/// Scheduler output data
#[derive(Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct SchedulerData {
	pub read_chunks:         u64,
	pub write_chunks:        u64,
	pub retired:             u64,
	pub admissions_rejected: u64,
	pub chunks_rejected:     u64,
	pub callback_refusals:   u64,
	pub latency:             Option<LatencySummary>,
}

impl SchedulerData {
	/// Collects the scheduler's statistics
	pub fn new(statistics: &Statistics) -> Self {
		Self {
			read_chunks:         statistics.read_chunks(),
			write_chunks:        statistics.write_chunks(),
			retired:             statistics.retired(),
			admissions_rejected: statistics.admissions_rejected(),
			chunks_rejected:     statistics.chunks_rejected(),
			callback_refusals:   statistics.callback_refusals(),
			latency:             statistics.latency_summary(),
		}
	}
}
