//! Dependency scheduler.
//!
//! Requests are admitted into the scheduler, wait until none of their dependencies
//! are pending or in flight (plus their extra delay), and are then issued chunk by
//! chunk to a [`MemorySystem`].
//!
//! Each admitted request goes through the following states:
//! - [`RecordState::Pending`]: Not all chunks have been issued.
//! - [`RecordState::InFlight`]: Read with all chunks issued, waiting for the last chunk to finish.
//! - [`RecordState::Completed`]: Waiting for its completion callback to accept it.
//!
//! Writes skip [`RecordState::InFlight`] and complete as soon as they're fully issued.

// Modules
pub mod statistics;

// Exports
pub use self::statistics::Statistics;

// Imports
use {
	crate::{
		memory::{Chunk, CompletionSink, MemorySystem},
		request::{OpKind, Request, RequestId},
		Cycle,
	},
	std::{
		collections::{BTreeMap, HashMap},
		fmt,
	},
};

/// Completion callback.
///
/// Called every cycle with a completed request until it returns `true`.
pub type CompletionCallback = Box<dyn FnMut(&Request) -> bool>;

/// Scheduler configuration
#[derive(Clone, Copy, Debug, Default)]
pub struct SchedulerConfig {
	/// Maximum requests pending or completed at once
	pub max_outstanding: usize,

	/// Id passed along with every chunk
	pub source_id: usize,

	/// Whether to log every scheduling event
	pub enable_logging: bool,
}

/// State of an admitted request
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum RecordState {
	/// Not fully issued
	Pending,

	/// Fully issued read, waiting on the memory system
	InFlight,

	/// Waiting for its completion callback to accept it
	Completed,
}

/// Request rejected on admission.
///
/// Gives back the request and its callback so admission can be retried.
pub struct Rejected {
	/// Request
	pub request: Request,

	/// Completion callback
	pub callback: CompletionCallback,
}

impl fmt::Debug for Rejected {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Rejected")
			.field("request", &self.request)
			.finish_non_exhaustive()
	}
}

/// Scheduled request
#[derive(Clone, Debug)]
struct Entry {
	/// Request
	request: Request,

	/// Earliest cycle the request may issue on.
	///
	/// `Some` once all dependencies were solved, never changed afterwards.
	min_issue_cycle: Option<Cycle>,

	/// Cycle the request was admitted on
	admitted_at: Cycle,
}

/// Dependency scheduler
pub struct Scheduler {
	/// Config
	config: SchedulerConfig,

	/// Current cycle
	cycle: Cycle,

	/// Pending requests.
	///
	/// Note: Ordered so that issuing always visits requests by ascending id.
	pending: BTreeMap<RequestId, Entry>,

	/// Reads in flight
	in_flight: BTreeMap<RequestId, Entry>,

	/// Completed requests, in completion order
	completed: Vec<Entry>,

	/// Completion callbacks of every outstanding request
	callbacks: HashMap<RequestId, CompletionCallback>,

	/// Statistics
	statistics: Statistics,
}

impl Scheduler {
	/// Creates a new, empty, scheduler
	pub fn new(config: SchedulerConfig) -> Self {
		Self {
			config,
			cycle: 0,
			pending: BTreeMap::new(),
			in_flight: BTreeMap::new(),
			completed: vec![],
			callbacks: HashMap::new(),
			statistics: Statistics::new(),
		}
	}

	/// Admits a request.
	///
	/// # Errors
	/// Returns the request and callback back if the scheduler is full.
	///
	/// # Panics
	/// Panics if a request with the same id is still outstanding.
	/// Panics if the request has no chunks to issue.
	pub fn admit(&mut self, request: Request, callback: CompletionCallback) -> Result<(), Rejected> {
		if self.outstanding() >= self.config.max_outstanding {
			self.statistics.register_admission_rejected();
			return Err(Rejected { request, callback });
		}

		let id = request.id();
		assert!(
			!self.callbacks.contains_key(&id),
			"Request {id} is already outstanding"
		);
		assert!(!request.is_fully_issued(), "Request {id} has no chunks to issue");

		let min_issue_cycle = self
			.deps_solved(request.deps())
			.then(|| self.cycle.saturating_add(request.delay()));
		if self.config.enable_logging {
			tracing::debug!(id, cycle = self.cycle, ?min_issue_cycle, "Admitted request");
		}

		self.pending.insert(id, Entry {
			request,
			min_issue_cycle,
			admitted_at: self.cycle,
		});
		self.callbacks.insert(id, callback);

		Ok(())
	}

	/// Advances the scheduler by a cycle.
	///
	/// Issues as many chunks as `memory` accepts, then offers every completed
	/// request to its completion callback.
	pub fn tick<M: MemorySystem + ?Sized>(&mut self, memory: &mut M) {
		self.cycle += 1;
		self.issue(memory);
		self.consume_completions();
	}

	/// Issues chunks of all eligible pending requests
	fn issue<M: MemorySystem + ?Sized>(&mut self, memory: &mut M) {
		// Note: Requests are removed from `pending` while issuing, so we visit a snapshot of the ids
		let ids = self.pending.keys().copied().collect::<Vec<_>>();
		for id in ids {
			let entry = self.pending.get_mut(&id).expect("Pending request vanished while issuing");
			match entry.min_issue_cycle {
				Some(min_issue_cycle) if min_issue_cycle <= self.cycle => (),
				_ => continue,
			}

			// Issue chunks in order, stopping at the first the memory system rejects
			let kind = entry.request.kind();
			while let Some(chunk_id) = entry.request.next_chunk() {
				let chunk = Chunk {
					addr: entry.request.chunk_addr(chunk_id),
					kind,
					source_id: self.config.source_id,
					request_id: id,
					chunk_id,
					is_last: entry.request.remaining_len() == 1,
				};
				if !memory.push_chunk(chunk) {
					self.statistics.register_chunk_rejected();
					break;
				}

				entry.request.pop_chunk();
				self.statistics.register_chunk(kind);
				if self.config.enable_logging {
					tracing::trace!(id, chunk_id, addr = chunk.addr, cycle = self.cycle, "Issued chunk");
				}
			}

			if !entry.request.is_fully_issued() {
				continue;
			}

			let entry = self.pending.remove(&id).expect("Pending request vanished while issuing");
			if self.config.enable_logging {
				tracing::debug!(id, %kind, cycle = self.cycle, "Request fully issued");
			}
			match kind {
				OpKind::Read => {
					self.in_flight.insert(id, entry);
				},

				// Note: Writes complete right away, which may unblock their dependents
				OpKind::Write => {
					self.completed.push(entry);
					self.update_deps_solved();
				},
			}
		}
	}

	/// Offers every completed request to its callback, keeping those refused
	fn consume_completions(&mut self) {
		let completed = std::mem::take(&mut self.completed);
		for entry in completed {
			let id = entry.request.id();
			let callback = self
				.callbacks
				.get_mut(&id)
				.expect("Completed request had no callback");

			match callback(&entry.request) {
				true => {
					self.callbacks.remove(&id);
					self.statistics.register_retired(self.cycle - entry.admitted_at);
					if self.config.enable_logging {
						tracing::debug!(id, cycle = self.cycle, "Retired request");
					}
				},
				false => {
					self.statistics.register_callback_refusal();
					self.completed.push(entry);
				},
			}
		}
	}

	/// Returns if none of `deps` are pending or in flight
	fn deps_solved(&self, deps: &[RequestId]) -> bool {
		deps.iter()
			.all(|dep| !self.pending.contains_key(dep) && !self.in_flight.contains_key(dep))
	}

	/// Marks every pending request whose dependencies are now solved
	fn update_deps_solved(&mut self) {
		let solved = self
			.pending
			.iter()
			.filter(|(_, entry)| entry.min_issue_cycle.is_none() && self.deps_solved(entry.request.deps()))
			.map(|(&id, _)| id)
			.collect::<Vec<_>>();

		for id in solved {
			let entry = self.pending.get_mut(&id).expect("Pending request vanished");
			let min_issue_cycle = self.cycle.saturating_add(entry.request.delay());
			entry.min_issue_cycle = Some(min_issue_cycle);
			if self.config.enable_logging {
				tracing::debug!(id, cycle = self.cycle, min_issue_cycle, "Dependencies solved");
			}
		}
	}

	/// Returns if no requests are pending, in flight or completed
	pub fn is_drained(&self) -> bool {
		self.pending.is_empty() && self.in_flight.is_empty() && self.completed.is_empty()
	}

	/// Returns the current cycle
	pub fn cycle(&self) -> Cycle {
		self.cycle
	}

	/// Returns the number of requests counted against the capacity (pending and completed)
	pub fn outstanding(&self) -> usize {
		self.pending.len() + self.completed.len()
	}

	/// Returns the number of pending requests
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	/// Returns the number of reads in flight
	pub fn in_flight_len(&self) -> usize {
		self.in_flight.len()
	}

	/// Returns the number of completed requests not yet accepted
	pub fn completed_len(&self) -> usize {
		self.completed.len()
	}

	/// Returns the state of request `id`, if it's outstanding
	pub fn state_of(&self, id: RequestId) -> Option<RecordState> {
		if self.pending.contains_key(&id) {
			Some(RecordState::Pending)
		} else if self.in_flight.contains_key(&id) {
			Some(RecordState::InFlight)
		} else if self.callbacks.contains_key(&id) {
			Some(RecordState::Completed)
		} else {
			None
		}
	}

	/// Returns the earliest issue cycle of request `id`, if it's outstanding and its dependencies were solved
	pub fn min_issue_cycle(&self, id: RequestId) -> Option<Cycle> {
		self.entry(id).and_then(|entry| entry.min_issue_cycle)
	}

	/// Returns the outstanding request `id`
	pub fn request(&self, id: RequestId) -> Option<&Request> {
		self.entry(id).map(|entry| &entry.request)
	}

	fn entry(&self, id: RequestId) -> Option<&Entry> {
		self.pending
			.get(&id)
			.or_else(|| self.in_flight.get(&id))
			.or_else(|| self.completed.iter().find(|entry| entry.request.id() == id))
	}

	/// Returns the statistics
	pub fn statistics(&self) -> &Statistics {
		&self.statistics
	}

	/// Formats debug output to `f`.
	pub fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Cycle {}: {} pending, {} in flight, {} completed, {} chunks issued, {} retired",
			self.cycle,
			self.pending.len(),
			self.in_flight.len(),
			self.completed.len(),
			self.statistics.chunks_issued(),
			self.statistics.retired(),
		)?;

		if let Some(latency) = self.statistics.latency_summary() {
			write!(
				f,
				", latency {:.2} ± {:.2} ({}..{})",
				latency.mean, latency.error, latency.min, latency.max
			)?;
		}

		Ok(())
	}
}

impl CompletionSink for Scheduler {
	/// Handles a finished chunk.
	///
	/// Only the last chunk of a read moves it out of flight.
	///
	/// # Panics
	/// Panics if the chunk belongs to a write.
	/// Panics if the chunk is signaled as last but its request isn't in flight.
	/// Panics if the chunk's last flag doesn't match whether it's the request's final chunk.
	fn completion_signal(&mut self, chunk: &Chunk) {
		let id = chunk.request_id;
		assert!(
			chunk.kind == OpKind::Read,
			"Completion signal for write request {id} (chunk {})",
			chunk.chunk_id
		);

		if !chunk.is_last {
			// Note: Earlier chunks may finish while the request is still pending,
			//       so these are only checked against the chunk sequence.
			match self.pending.get(&id).or_else(|| self.in_flight.get(&id)) {
				Some(entry) => assert!(
					entry.request.last_chunk_id() != Some(chunk.chunk_id),
					"Chunk {} is the last chunk of request {id}, but wasn't signaled as last",
					chunk.chunk_id
				),
				None => tracing::trace!(id, chunk_id = chunk.chunk_id, "Ignoring chunk of request not outstanding"),
			}
			return;
		}

		let entry = self
			.in_flight
			.remove(&id)
			.unwrap_or_else(|| panic!("Last chunk signaled for request {id}, which isn't in flight"));
		assert!(
			entry.request.last_chunk_id() == Some(chunk.chunk_id),
			"Chunk {} signaled as last of request {id}, but its last chunk is {:?}",
			chunk.chunk_id,
			entry.request.last_chunk_id()
		);

		if self.config.enable_logging {
			tracing::debug!(id, cycle = self.cycle, "Read completed");
		}
		self.completed.push(entry);
		self.update_deps_solved();
	}
}

impl fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("config", &self.config)
			.field("cycle", &self.cycle)
			.field("pending", &self.pending)
			.field("in_flight", &self.in_flight)
			.field("completed", &self.completed)
			.field("statistics", &self.statistics)
			.finish_non_exhaustive()
	}
}
