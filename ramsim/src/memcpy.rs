//! Memcpy driver.
//!
//! Copies a memory region by reading it chunk by chunk and writing each chunk
//! to the destination once its read has finished.

// Imports
use {
	crate::{
		memory::{Chunk, CompletionSink, MemorySystem},
		request::{ChunkIdAllocator, OpKind, Request, RequestId, CHUNK_BYTES},
		scheduler::Scheduler,
		sim::Frontend,
		trace::Record,
	},
	anyhow::Context,
	std::{collections::VecDeque, fmt},
};

/// Memcpy driver
#[derive(Debug)]
pub struct MemCpyDriver {
	/// Scheduler
	scheduler: Scheduler,

	/// Chunk ids
	chunk_ids: ChunkIdAllocator,

	/// Next request id
	next_id: RequestId,

	/// Requests waiting to be admitted, in admission order.
	///
	/// Note: A write must never be admitted before its read, else the read
	///       wouldn't be outstanding and the write would issue right away.
	queue: VecDeque<Request>,
}

impl MemCpyDriver {
	/// Creates a new, idle, driver
	pub fn new(scheduler: Scheduler) -> Self {
		Self {
			scheduler,
			chunk_ids: ChunkIdAllocator::new(),
			next_id: 0,
			queue: VecDeque::new(),
		}
	}

	/// Starts copying `size` bytes from `src` to `dst`.
	///
	/// # Errors
	/// Returns an error if either region wraps around the address space.
	/// Nothing is queued in that case.
	pub fn start(&mut self, src: u64, dst: u64, size: u64) -> Result<(), anyhow::Error> {
		src.checked_add(size)
			.with_context(|| format!("Source region {src:#x}+{size:#x} overflows"))?;
		dst.checked_add(size)
			.with_context(|| format!("Destination region {dst:#x}+{size:#x} overflows"))?;

		tracing::debug!(src, dst, size, "Starting memcpy");
		for offset in (0..size).step_by(CHUNK_BYTES as usize) {
			let read_id = self.push_request(src + offset, OpKind::Read, vec![])?;
			self.push_request(dst + offset, OpKind::Write, vec![read_id])?;
		}

		Ok(())
	}

	fn push_request(&mut self, addr: u64, kind: OpKind, deps: Vec<RequestId>) -> Result<RequestId, anyhow::Error> {
		let id = self.next_id;
		self.next_id += 1;

		let record = Record {
			id,
			addr,
			kind,
			delay: 0,
			byte_size: CHUNK_BYTES,
			deps,
		};
		let request = Request::new(record, &mut self.chunk_ids).context("Ran out of chunk ids")?;
		self.queue.push_back(request);

		Ok(id)
	}

	/// Advances the driver by a cycle.
	///
	/// Ticks the scheduler, then admits queued requests until one is rejected.
	pub fn tick<M: MemorySystem + ?Sized>(&mut self, memory: &mut M) {
		self.scheduler.tick(memory);

		while let Some(request) = self.queue.pop_front() {
			if let Err(rejected) = self.scheduler.admit(request, Box::new(|_: &Request| true)) {
				self.queue.push_front(rejected.request);
				break;
			}
		}
	}

	/// Returns if every started copy finished
	pub fn is_finished(&self) -> bool {
		self.queue.is_empty() && self.scheduler.is_drained()
	}

	/// Returns the number of requests waiting to be admitted
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	/// Returns the scheduler
	pub fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}
}

impl CompletionSink for MemCpyDriver {
	fn completion_signal(&mut self, chunk: &Chunk) {
		self.scheduler.completion_signal(chunk);
	}
}

impl Frontend for MemCpyDriver {
	fn tick(&mut self, memory: &mut dyn MemorySystem) -> Result<(), anyhow::Error> {
		MemCpyDriver::tick(self, memory);
		Ok(())
	}

	fn is_finished(&self) -> bool {
		MemCpyDriver::is_finished(self)
	}

	fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}

	fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.scheduler.fmt_debug(f)?;
		write!(f, ", {} queued", self.queue.len())
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{
			memory::{FixedLatencyMemory, MemoryConfig},
			scheduler::SchedulerConfig,
			sim::Simulator,
			Cycle,
		},
		std::time::Duration,
	};

	const SRC: u64 = 0x1000_0000;
	const DST: u64 = 0x2000_0000;

	/// Memory that remembers the cycle every chunk was accepted on
	struct LoggingMemory {
		inner:  FixedLatencyMemory,
		pushed: Vec<(Cycle, Chunk)>,
	}

	impl MemorySystem for LoggingMemory {
		fn push_chunk(&mut self, chunk: Chunk) -> bool {
			let accepted = self.inner.push_chunk(chunk);
			if accepted {
				self.pushed.push((self.inner.cycle(), chunk));
			}
			accepted
		}

		fn tick(&mut self, sink: &mut dyn CompletionSink) {
			self.inner.tick(sink);
		}
	}

	fn run_memcpy(size: u64, max_outstanding: usize) -> (MemCpyDriver, LoggingMemory) {
		let mut driver = MemCpyDriver::new(Scheduler::new(SchedulerConfig {
			max_outstanding,
			..SchedulerConfig::default()
		}));
		driver.start(SRC, DST, size).expect("Unable to start memcpy");

		let mut memory = LoggingMemory {
			inner:  FixedLatencyMemory::new(MemoryConfig {
				latency: 5,
				..MemoryConfig::default()
			}),
			pushed: vec![],
		};
		Simulator::new(1, Some(10_000), Duration::from_secs(3600))
			.run(&mut driver, &mut memory)
			.expect("Unable to run memcpy");

		(driver, memory)
	}

	fn assert_writes_after_reads(memory: &LoggingMemory) {
		for &(write_cycle, write) in memory.pushed.iter().filter(|(_, chunk)| chunk.kind == OpKind::Write) {
			let offset = write.addr - DST;
			let &(read_cycle, _) = memory
				.pushed
				.iter()
				.find(|(_, chunk)| chunk.kind == OpKind::Read && chunk.addr == SRC + offset)
				.expect("Write issued without its read");
			assert!(
				write_cycle >= read_cycle + 5,
				"Write at {write_cycle} issued before its read (issued at {read_cycle}) finished"
			);
		}
	}

	#[test]
	fn copies_every_chunk() {
		let (driver, memory) = run_memcpy(256, 16);

		let statistics = driver.scheduler().statistics();
		assert_eq!(statistics.read_chunks(), 4);
		assert_eq!(statistics.write_chunks(), 4);
		assert_eq!(statistics.retired(), 8);
		assert_eq!(memory.inner.statistics().reads, 4);
		assert_eq!(memory.inner.statistics().writes, 4);
		assert_writes_after_reads(&memory);
	}

	#[test]
	fn partial_chunk_is_copied() {
		let (driver, _) = run_memcpy(100, 16);
		assert_eq!(driver.scheduler().statistics().chunks_issued(), 4);
	}

	#[test]
	fn keeps_order_under_backpressure() {
		let (driver, memory) = run_memcpy(512, 1);

		assert!(driver.is_finished());
		assert_eq!(driver.queued(), 0);
		assert!(driver.scheduler().statistics().admissions_rejected() > 0);
		assert_eq!(driver.scheduler().statistics().retired(), 16);
		assert_writes_after_reads(&memory);
	}

	#[test]
	fn empty_copy_is_finished() {
		let mut driver = MemCpyDriver::new(Scheduler::new(SchedulerConfig::default()));
		driver.start(SRC, DST, 0).expect("Unable to start memcpy");
		assert!(driver.is_finished());
	}

	#[test]
	fn rejects_wrapping_regions() {
		let mut driver = MemCpyDriver::new(Scheduler::new(SchedulerConfig::default()));
		driver
			.start(u64::MAX - 64, DST, 256)
			.expect_err("Source region should overflow");
		driver
			.start(SRC, u64::MAX - 64, 256)
			.expect_err("Destination region should overflow");
		assert_eq!(driver.queued(), 0);
	}
}
