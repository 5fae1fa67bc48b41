//! Simulator

// Imports
use {
	crate::{
		memory::{CompletionSink, MemorySystem},
		scheduler::{Scheduler, Statistics},
		Cycle,
	},
	std::{
		fmt,
		time::{Duration, Instant},
	},
};

/// Simulator
#[derive(Debug)]
pub struct Simulator {
	/// Clock ratio.
	///
	/// The frontend is ticked once every `clock_ratio` memory cycles.
	clock_ratio: u64,

	/// Maximum frontend cycles before giving up
	max_cycles: Option<Cycle>,

	/// Debug output period
	///
	/// Interval in which to output debug output for the frontend
	debug_output_period: Duration,
}

impl Simulator {
	/// Creates a new simulator
	///
	/// # Panics
	/// Panics if `clock_ratio` is 0.
	pub fn new(clock_ratio: u64, max_cycles: Option<Cycle>, debug_output_period: Duration) -> Self {
		assert!(clock_ratio > 0, "Clock ratio must be > 0");
		Self {
			clock_ratio,
			max_cycles,
			debug_output_period,
		}
	}

	/// Runs `frontend` against `memory` until the frontend finishes
	pub fn run<F: Frontend, M: MemorySystem>(
		&mut self,
		frontend: &mut F,
		memory: &mut M,
	) -> Result<RunOutput, anyhow::Error> {
		// Note: We start in the past so that we output right away at the start
		let mut last_debug_time = Instant::now()
			.checked_sub(self.debug_output_period)
			.unwrap_or_else(Instant::now);

		let mut memory_cycles = 0;
		while !frontend.is_finished() {
			if memory_cycles % self.clock_ratio == 0 {
				frontend.tick(memory)?;
			}
			memory.tick(frontend);
			memory_cycles += 1;

			let cycle = frontend.scheduler().cycle();
			if let Some(max_cycles) = self.max_cycles {
				anyhow::ensure!(
					cycle <= max_cycles,
					"Exceeded {max_cycles} cycles without finishing ({})",
					ramsim_util::DisplayWrapper::new(|f| frontend.fmt_debug(f))
				);
			}

			// Then show debug output, if it's been long enough
			let cur_time = Instant::now();
			if cur_time.duration_since(last_debug_time) >= self.debug_output_period {
				tracing::info!(
					"Progress: {}",
					ramsim_util::DisplayWrapper::new(|f| frontend.fmt_debug(f))
				);
				last_debug_time = cur_time;
			}
		}

		let scheduler = frontend.scheduler();
		tracing::info!(cycles = scheduler.cycle(), memory_cycles, "Frontend finished");

		Ok(RunOutput {
			cycles: scheduler.cycle(),
			memory_cycles,
			statistics: scheduler.statistics().clone(),
		})
	}
}

/// Output for [`Simulator::run`]
#[derive(Clone, Debug)]
pub struct RunOutput {
	/// Frontend cycles
	pub cycles: Cycle,

	/// Memory cycles
	pub memory_cycles: Cycle,

	/// Scheduler statistics
	pub statistics: Statistics,
}

/// Frontend.
///
/// Generates requests and feeds them through a [`Scheduler`].
pub trait Frontend: CompletionSink {
	/// Advances the frontend by a cycle
	fn tick(&mut self, memory: &mut dyn MemorySystem) -> Result<(), anyhow::Error>;

	/// Returns if the frontend has nothing left to do
	fn is_finished(&self) -> bool;

	/// Returns the scheduler
	fn scheduler(&self) -> &Scheduler;

	/// Formats debug output to `f`.
	fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.scheduler().fmt_debug(f)
	}
}
