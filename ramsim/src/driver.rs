//! Trace driver

// Imports
use {
	crate::{
		memory::{Chunk, CompletionSink, MemorySystem},
		request::Request,
		scheduler::Scheduler,
		sim::Frontend,
		trace::{TraceError, TraceReader},
	},
	anyhow::Context,
	std::{fmt, io},
};

/// Trace driver.
///
/// Feeds every request of a trace into a scheduler, one at a time.
/// A single decoded request is kept staged while the scheduler is full.
#[derive(Debug)]
pub struct TraceDriver<R> {
	/// Trace
	trace: TraceReader<R>,

	/// Scheduler
	scheduler: Scheduler,

	/// Request decoded, but not yet admitted
	staged: Option<Request>,

	/// Whether the trace ended
	exhausted: bool,
}

impl<R: io::Read + io::Seek> TraceDriver<R> {
	/// Creates a new driver
	pub fn new(trace: TraceReader<R>, scheduler: Scheduler) -> Self {
		Self {
			trace,
			scheduler,
			staged: None,
			exhausted: false,
		}
	}

	/// Advances the driver by a cycle.
	///
	/// Ticks the scheduler, then tries to admit the staged request, and finally
	/// decodes the next request if nothing is staged.
	///
	/// # Errors
	/// Returns an error if unable to decode the next request.
	pub fn tick<M: MemorySystem + ?Sized>(&mut self, memory: &mut M) -> Result<(), TraceError> {
		if self.is_finished() {
			return Ok(());
		}

		self.scheduler.tick(memory);

		if let Some(request) = self.staged.take() {
			// Note: We only generate load, so every completion is accepted right away
			if let Err(rejected) = self.scheduler.admit(request, Box::new(|_: &Request| true)) {
				tracing::trace!(id = rejected.request.id(), "Scheduler full, keeping request staged");
				self.staged = Some(rejected.request);
			}
		}

		if self.staged.is_none() && !self.exhausted {
			match self.trace.read_next()? {
				Some(request) => self.staged = Some(request),
				None => {
					tracing::debug!(cycle = self.scheduler.cycle(), "Trace exhausted");
					self.exhausted = true;
				},
			}
		}

		Ok(())
	}

	/// Returns if the whole trace was issued and completed
	pub fn is_finished(&self) -> bool {
		self.exhausted && self.staged.is_none() && self.scheduler.is_drained()
	}

	/// Returns if the trace ended
	pub fn is_exhausted(&self) -> bool {
		self.exhausted
	}

	/// Returns the staged request
	pub fn staged(&self) -> Option<&Request> {
		self.staged.as_ref()
	}

	/// Returns the scheduler
	pub fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}
}

impl<R> CompletionSink for TraceDriver<R> {
	fn completion_signal(&mut self, chunk: &Chunk) {
		self.scheduler.completion_signal(chunk);
	}
}

impl<R: io::Read + io::Seek> Frontend for TraceDriver<R> {
	fn tick(&mut self, memory: &mut dyn MemorySystem) -> Result<(), anyhow::Error> {
		TraceDriver::tick(self, memory).context("Unable to read trace")
	}

	fn is_finished(&self) -> bool {
		TraceDriver::is_finished(self)
	}

	fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}

	fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.scheduler.fmt_debug(f)?;
		if self.exhausted {
			write!(f, " (trace exhausted)")?;
		}

		Ok(())
	}
}
