//! Requests
//!
//! A [`Request`] is a [`Record`] (one logical access) together with the chunk ids
//! it was assigned. Each chunk covers [`CHUNK_BYTES`] bytes of the access and is the
//! unit actually sent to the memory system.

// Imports
use {
	crate::trace::Record,
	std::{fmt, ops::Range},
};

/// Bytes covered by a single chunk
pub const CHUNK_BYTES: u64 = 64;

/// Request id
pub type RequestId = u64;

/// Chunk id
pub type ChunkId = u64;

/// Returns the number of chunks needed for an access of `byte_size` bytes
pub const fn chunk_count(byte_size: u64) -> u64 {
	byte_size.div_ceil(CHUNK_BYTES)
}

/// Operation kind
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum OpKind {
	/// Read
	Read,

	/// Write
	Write,
}

impl OpKind {
	/// Parses an operation kind from its trace encoding
	pub fn from_raw(raw: u64) -> Option<Self> {
		match raw {
			0 => Some(Self::Read),
			1 => Some(Self::Write),
			_ => None,
		}
	}

	/// Returns the trace encoding of this operation kind
	pub fn to_raw(self) -> u64 {
		match self {
			Self::Read => 0,
			Self::Write => 1,
		}
	}
}

impl fmt::Display for OpKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Read => f.pad("read"),
			Self::Write => f.pad("write"),
		}
	}
}

/// Chunk id allocator.
///
/// Hands out chunk ids from a single, strictly increasing counter.
#[derive(Clone, Debug, Default)]
pub struct ChunkIdAllocator {
	/// Next chunk id
	next: ChunkId,
}

impl ChunkIdAllocator {
	/// Creates an allocator starting at chunk id 0
	pub fn new() -> Self {
		Self { next: 0 }
	}

	/// Allocates `count` consecutive chunk ids, returning the first.
	///
	/// Returns `None`, without allocating anything, if the ids would overflow.
	pub fn alloc(&mut self, count: u64) -> Option<ChunkId> {
		let start = self.next;
		self.next = start.checked_add(count)?;
		Some(start)
	}

	/// Returns the next chunk id that will be handed out
	pub fn next_id(&self) -> ChunkId {
		self.next
	}

	/// Resets the counter back to 0
	pub fn reset(&mut self) {
		self.next = 0;
	}
}

/// Request
#[derive(Clone, Debug)]
pub struct Request {
	/// Record
	record: Record,

	/// First chunk id
	chunk_id_start: ChunkId,

	/// Chunks not yet issued
	remaining_chunks: Range<ChunkId>,
}

impl Request {
	/// Creates a request from a record, assigning it chunk ids from `chunk_ids`.
	///
	/// Returns `None` if `chunk_ids` can't fit all of the record's chunks.
	pub fn new(record: Record, chunk_ids: &mut ChunkIdAllocator) -> Option<Self> {
		let count = self::chunk_count(record.byte_size);
		let chunk_id_start = chunk_ids.alloc(count)?;

		Some(Self {
			record,
			chunk_id_start,
			remaining_chunks: chunk_id_start..chunk_id_start + count,
		})
	}

	/// Returns the id
	pub fn id(&self) -> RequestId {
		self.record.id
	}

	/// Returns the base address
	pub fn addr(&self) -> u64 {
		self.record.addr
	}

	/// Returns the operation kind
	pub fn kind(&self) -> OpKind {
		self.record.kind
	}

	/// Returns the extra delay, in cycles, applied once dependencies are solved
	pub fn delay(&self) -> u64 {
		self.record.delay
	}

	/// Returns the size, in bytes
	pub fn byte_size(&self) -> u64 {
		self.record.byte_size
	}

	/// Returns the ids of all requests this request depends on
	pub fn deps(&self) -> &[RequestId] {
		&self.record.deps
	}

	/// Returns the underlying record
	pub fn record(&self) -> &Record {
		&self.record
	}

	/// Returns the first chunk id
	pub fn chunk_id_start(&self) -> ChunkId {
		self.chunk_id_start
	}

	/// Returns the total number of chunks
	pub fn chunk_count(&self) -> u64 {
		self::chunk_count(self.record.byte_size)
	}

	/// Returns the last chunk id, if there are any chunks
	pub fn last_chunk_id(&self) -> Option<ChunkId> {
		match self.chunk_count() {
			0 => None,
			count => Some(self.chunk_id_start + count - 1),
		}
	}

	/// Returns the address of chunk `chunk_id`.
	///
	/// # Panics
	/// Panics if `chunk_id` doesn't belong to this request.
	pub fn chunk_addr(&self, chunk_id: ChunkId) -> u64 {
		let idx = chunk_id
			.checked_sub(self.chunk_id_start)
			.filter(|&idx| idx < self.chunk_count())
			.unwrap_or_else(|| panic!("Chunk {chunk_id} doesn't belong to request {}", self.id()));

		self.record.addr.wrapping_add(idx * CHUNK_BYTES)
	}

	/// Returns all chunks not yet issued, in ascending order
	pub fn remaining_chunks(&self) -> Range<ChunkId> {
		self.remaining_chunks.clone()
	}

	/// Returns the number of chunks not yet issued
	pub fn remaining_len(&self) -> u64 {
		self.remaining_chunks.end - self.remaining_chunks.start
	}

	/// Returns the next chunk to issue
	pub fn next_chunk(&self) -> Option<ChunkId> {
		self.remaining_chunks.clone().next()
	}

	/// Marks the next chunk as issued, returning it
	pub fn pop_chunk(&mut self) -> Option<ChunkId> {
		self.remaining_chunks.next()
	}

	/// Returns if all chunks have been issued
	pub fn is_fully_issued(&self) -> bool {
		self.remaining_chunks.is_empty()
	}
}
