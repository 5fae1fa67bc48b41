//! Binary traces.
//!
//! A trace starts with the 8-byte magic [`MAGIC`], followed by records, each made of
//! six little-endian `u64` fields (`id`, `addr`, `kind`, `delay`, `byte_size`, `dep_count`)
//! and `dep_count` little-endian `u64` dependency ids.
//!
//! Record ids must start at 0 and increase by exactly 1 per record.

// Imports
use {
	crate::request::{ChunkIdAllocator, OpKind, Request, RequestId},
	anyhow::Context,
	byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt},
	ramsim_util::ReadByteArray,
	std::{
		fs,
		io::{self, BufReader},
		path::{Path, PathBuf},
	},
};

/// Magic
pub const MAGIC: [u8; 8] = *b"BINFILE\0";

/// Trace error
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
	/// Unable to open the trace file
	#[error("Unable to open trace file {path:?}")]
	File {
		path:   PathBuf,
		#[source]
		source: io::Error,
	},

	/// Unable to read from the trace
	#[error("Unable to read trace")]
	Io(#[source] io::Error),

	/// Trace is malformed
	#[error("Malformed trace")]
	Format(#[from] FormatError),
}

/// Format error
#[derive(PartialEq, Eq, Clone, Debug, thiserror::Error)]
pub enum FormatError {
	/// Wrong magic
	#[error("Found wrong magic {found:?}, expected {:?}", MAGIC)]
	Magic { found: [u8; 8] },

	/// Record id isn't the one after the previous record
	#[error("Record id is not contiguous, should be {expected:#x} but {found:#x} encountered")]
	NonContiguousId { expected: RequestId, found: RequestId },

	/// Unknown operation kind
	#[error("Record {id:#x} has unknown operation kind {raw}")]
	UnknownOpKind { id: RequestId, raw: u64 },

	/// Record has no bytes to access
	#[error("Record {id:#x} has a size of 0")]
	ZeroSize { id: RequestId },

	/// Record has more chunks than there are chunk ids left
	#[error("Record {id:#x} has too many chunks")]
	ChunkIdOverflow { id: RequestId },

	/// Trace ended in the middle of the magic or a record
	#[error("Trace ended in the middle of a record")]
	Truncated,
}

impl TraceError {
	/// Returns the format error, if this is one
	pub fn as_format(&self) -> Option<&FormatError> {
		match self {
			Self::Format(err) => Some(err),
			_ => None,
		}
	}
}

/// Maps an error reading a field, where running out of input means a truncated trace
fn field_err(err: io::Error) -> TraceError {
	match err.kind() {
		io::ErrorKind::UnexpectedEof => TraceError::Format(FormatError::Truncated),
		_ => TraceError::Io(err),
	}
}

/// Returns if `magic` matches [`MAGIC`], comparing only up to the first null
fn magic_matches(magic: &[u8; 8]) -> bool {
	let expected = &MAGIC[..MAGIC.len() - 1];
	match magic.iter().position(|&b| b == 0) {
		Some(len) => &magic[..len] == expected,
		None => false,
	}
}

/// Trace reader
#[derive(Debug)]
pub struct TraceReader<R> {
	/// Id expected for the next record
	expected_id: RequestId,

	/// Chunk ids
	chunk_ids: ChunkIdAllocator,

	/// Reader
	reader: R,
}

impl TraceReader<BufReader<fs::File>> {
	/// Opens the trace at `path`
	pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
		let path = path.as_ref();
		let file = fs::File::open(path).map_err(|source| TraceError::File {
			path: path.to_owned(),
			source,
		})?;

		Self::from_reader(BufReader::new(file))
	}
}

impl<R: io::Read + io::Seek> TraceReader<R> {
	/// Parses a trace from a reader
	pub fn from_reader(mut reader: R) -> Result<Self, TraceError> {
		Self::check_magic(&mut reader)?;

		Ok(Self {
			expected_id: 0,
			chunk_ids: ChunkIdAllocator::new(),
			reader,
		})
	}

	/// Reads the magic and checks it
	fn check_magic(reader: &mut R) -> Result<(), TraceError> {
		let magic = reader.read_byte_array::<8>().map_err(self::field_err)?;
		if !self::magic_matches(&magic) {
			return Err(FormatError::Magic { found: magic }.into());
		}

		Ok(())
	}

	/// Reads the next request.
	///
	/// Returns `Ok(None)` once the trace has ended.
	pub fn read_next(&mut self) -> Result<Option<Request>, TraceError> {
		let Some(record) = Record::from_reader(&mut self.reader)? else {
			return Ok(None);
		};

		if record.id != self.expected_id {
			return Err(FormatError::NonContiguousId {
				expected: self.expected_id,
				found:    record.id,
			}
			.into());
		}

		let id = record.id;
		let request = Request::new(record, &mut self.chunk_ids).ok_or(FormatError::ChunkIdOverflow { id })?;
		self.expected_id += 1;
		tracing::trace!(id = request.id(), chunk_id_start = request.chunk_id_start(), "Parsed record");

		Ok(Some(request))
	}

	/// Rewinds to the start of the trace, resetting both record and chunk ids
	pub fn reset(&mut self) -> Result<(), TraceError> {
		self.reader.rewind().map_err(TraceError::Io)?;
		Self::check_magic(&mut self.reader)?;
		self.expected_id = 0;
		self.chunk_ids.reset();

		Ok(())
	}

	/// Returns the id expected for the next record
	pub fn expected_id(&self) -> RequestId {
		self.expected_id
	}

	/// Returns the next chunk id that will be assigned
	pub fn next_chunk_id(&self) -> u64 {
		self.chunk_ids.next_id()
	}
}

/// Trace writer
#[derive(Clone, Debug)]
pub struct TraceWriter<W> {
	/// Records written
	records_written: u64,

	/// Writer
	writer: W,
}

impl<W: io::Write> TraceWriter<W> {
	/// Creates a new writer, writing the magic
	pub fn new(mut writer: W) -> Result<Self, anyhow::Error> {
		writer.write_all(&MAGIC).context("Unable to write magic")?;

		Ok(Self {
			records_written: 0,
			writer,
		})
	}

	/// Writes a record
	pub fn write(&mut self, record: &Record) -> Result<(), anyhow::Error> {
		record.to_writer(&mut self.writer).context("Unable to write record")?;

		self.records_written += 1;
		Ok(())
	}

	/// Returns the number of records written
	pub fn records_written(&self) -> u64 {
		self.records_written
	}

	/// Finishes writing
	pub fn finish(mut self) -> Result<W, anyhow::Error> {
		self.writer.flush().context("Unable to flush writer")?;
		Ok(self.writer)
	}
}

/// Record
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Record {
	/// Id
	pub id: RequestId,

	/// Base address
	pub addr: u64,

	/// Operation kind
	pub kind: OpKind,

	/// Extra delay, in cycles, once all dependencies are solved
	pub delay: u64,

	/// Size, in bytes
	pub byte_size: u64,

	/// Dependencies
	pub deps: Vec<RequestId>,
}

impl Record {
	/// Parses a record from a reader.
	///
	/// Returns `Ok(None)` if the reader was already at its end.
	pub fn from_reader<R: io::Read>(reader: &mut R) -> Result<Option<Self>, TraceError> {
		let Some(id) = self::read_first_field(reader)? else {
			return Ok(None);
		};
		let addr = reader.read_u64::<LittleEndian>().map_err(self::field_err)?;
		let raw_kind = reader.read_u64::<LittleEndian>().map_err(self::field_err)?;
		let delay = reader.read_u64::<LittleEndian>().map_err(self::field_err)?;
		let byte_size = reader.read_u64::<LittleEndian>().map_err(self::field_err)?;
		let dep_count = reader.read_u64::<LittleEndian>().map_err(self::field_err)?;

		// Note: We don't pre-allocate `dep_count` since it comes straight from the file
		let deps = (0..dep_count)
			.map(|_| reader.read_u64::<LittleEndian>().map_err(self::field_err))
			.collect::<Result<Vec<_>, _>>()?;

		let kind = OpKind::from_raw(raw_kind).ok_or(FormatError::UnknownOpKind { id, raw: raw_kind })?;
		if byte_size == 0 {
			return Err(FormatError::ZeroSize { id }.into());
		}

		Ok(Some(Self {
			id,
			addr,
			kind,
			delay,
			byte_size,
			deps,
		}))
	}

	/// Writes a record to a writer
	pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<(), anyhow::Error> {
		writer.write_u64::<LittleEndian>(self.id).context("Unable to write id")?;
		writer
			.write_u64::<LittleEndian>(self.addr)
			.context("Unable to write address")?;
		writer
			.write_u64::<LittleEndian>(self.kind.to_raw())
			.context("Unable to write kind")?;
		writer
			.write_u64::<LittleEndian>(self.delay)
			.context("Unable to write delay")?;
		writer
			.write_u64::<LittleEndian>(self.byte_size)
			.context("Unable to write size")?;
		writer
			.write_u64::<LittleEndian>(self.deps.len() as u64)
			.context("Unable to write dependency count")?;
		for &dep in &self.deps {
			writer
				.write_u64::<LittleEndian>(dep)
				.context("Unable to write dependency")?;
		}

		Ok(())
	}
}

/// Reads the first field of a record.
///
/// Returns `Ok(None)` if no bytes were left, distinguishing the end of the
/// trace from a record that was cut short.
fn read_first_field<R: io::Read>(reader: &mut R) -> Result<Option<u64>, TraceError> {
	let mut buffer = [0; 8];
	let mut filled = 0;
	while filled < buffer.len() {
		match reader.read(&mut buffer[filled..]) {
			Ok(0) => break,
			Ok(len) => filled += len,
			Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
			Err(err) => return Err(TraceError::Io(err)),
		}
	}

	match filled {
		0 => Ok(None),
		8 => Ok(Some(LittleEndian::read_u64(&buffer))),
		_ => Err(FormatError::Truncated.into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn read(id: RequestId, addr: u64, byte_size: u64, deps: Vec<RequestId>) -> Record {
		Record {
			id,
			addr,
			kind: OpKind::Read,
			delay: 0,
			byte_size,
			deps,
		}
	}

	fn encode(records: &[Record]) -> Vec<u8> {
		let mut writer = TraceWriter::new(vec![]).expect("Unable to create writer");
		for record in records {
			writer.write(record).expect("Unable to write record");
		}
		writer.finish().expect("Unable to finish writer")
	}

	fn reader(bytes: Vec<u8>) -> TraceReader<io::Cursor<Vec<u8>>> {
		TraceReader::from_reader(io::Cursor::new(bytes)).expect("Unable to create reader")
	}

	#[test]
	fn magic_compare_stops_at_null() {
		assert!(magic_matches(b"BINFILE\0"));
		assert!(!magic_matches(b"BINFILX\0"));
		assert!(!magic_matches(b"BINFILES"));
		assert!(!magic_matches(b"BIN\0FILE"));
	}

	#[test]
	fn round_trip() {
		let records = [
			read(0, 0x1000, 64, vec![]),
			Record {
				id:        1,
				addr:      0xdead_beef_0000,
				kind:      OpKind::Write,
				delay:     17,
				byte_size: 130,
				deps:      vec![0],
			},
		];
		let mut trace = reader(encode(&records));

		for expected in &records {
			let request = trace.read_next().expect("Unable to read").expect("Missing record");
			assert_eq!(request.record(), expected);
		}
		assert!(trace.read_next().expect("Unable to read").is_none());
	}

	#[test]
	fn assigns_chunk_ids() {
		let records = [read(0, 0x0, 192, vec![]), read(1, 0x0, 64, vec![]), read(2, 0x0, 65, vec![])];
		let mut trace = reader(encode(&records));

		let starts = std::iter::from_fn(|| trace.read_next().expect("Unable to read"))
			.map(|request| (request.chunk_id_start(), request.chunk_count()))
			.collect::<Vec<_>>();
		assert_eq!(starts, [(0, 3), (3, 1), (4, 2)]);
		assert_eq!(trace.next_chunk_id(), 6);
	}

	#[test]
	fn rejects_bad_magic() {
		let mut bytes = encode(&[read(0, 0x0, 64, vec![])]);
		bytes[0] = b'X';
		let err = TraceReader::from_reader(io::Cursor::new(bytes)).expect_err("Magic should be rejected");
		assert!(matches!(err.as_format(), Some(FormatError::Magic { .. })));
	}

	#[test]
	fn rejects_gap_in_ids() {
		let mut trace = reader(encode(&[read(0, 0x0, 64, vec![]), read(2, 0x0, 64, vec![])]));

		trace.read_next().expect("First record should parse");
		let err = trace.read_next().expect_err("Gap should be rejected");
		assert_eq!(
			err.as_format(),
			Some(&FormatError::NonContiguousId { expected: 1, found: 2 })
		);
	}

	#[test]
	fn rejects_first_id_not_zero() {
		let mut trace = reader(encode(&[read(1, 0x0, 64, vec![])]));
		let err = trace.read_next().expect_err("Id 1 first should be rejected");
		assert_eq!(
			err.as_format(),
			Some(&FormatError::NonContiguousId { expected: 0, found: 1 })
		);
	}

	#[test]
	fn rejects_truncated_record() {
		let mut bytes = encode(&[read(0, 0x0, 64, vec![3])]);
		bytes.truncate(bytes.len() - 4);
		let mut trace = reader(bytes);
		let err = trace.read_next().expect_err("Truncated record should be rejected");
		assert_eq!(err.as_format(), Some(&FormatError::Truncated));
	}

	#[test]
	fn rejects_unknown_kind_and_zero_size() {
		let mut bytes = encode(&[read(0, 0x0, 64, vec![])]);
		// Kind is the third field after the magic
		bytes[8 + 16] = 7;
		let err = reader(bytes).read_next().expect_err("Kind should be rejected");
		assert_eq!(err.as_format(), Some(&FormatError::UnknownOpKind { id: 0, raw: 7 }));

		let err = reader(encode(&[read(0, 0x0, 0, vec![])]))
			.read_next()
			.expect_err("Zero size should be rejected");
		assert_eq!(err.as_format(), Some(&FormatError::ZeroSize { id: 0 }));
	}

	#[test]
	fn huge_record_decodes() {
		let mut trace = reader(encode(&[read(0, 0x0, 1 << 50, vec![])]));

		let request = trace.read_next().expect("Unable to read").expect("Missing record");
		assert_eq!(request.chunk_count(), 1 << 44);
		assert_eq!(request.remaining_len(), 1 << 44);
		assert_eq!(trace.next_chunk_id(), 1 << 44);
	}

	#[test]
	fn rejects_chunk_id_overflow() {
		// Each record takes 2^58 chunk ids, so only 63 of them fit
		let records = (0..64).map(|id| read(id, 0x0, u64::MAX, vec![])).collect::<Vec<_>>();
		let mut trace = reader(encode(&records));

		for _ in 0..63 {
			trace.read_next().expect("Unable to read").expect("Missing record");
		}
		let err = trace.read_next().expect_err("Chunk ids should overflow");
		assert_eq!(err.as_format(), Some(&FormatError::ChunkIdOverflow { id: 63 }));
		assert_eq!(trace.expected_id(), 63);
	}

	#[test]
	fn reset_restarts_ids() {
		let mut trace = reader(encode(&[read(0, 0x0, 128, vec![]), read(1, 0x40, 64, vec![])]));
		while trace.read_next().expect("Unable to read").is_some() {}
		assert_eq!(trace.expected_id(), 2);

		trace.reset().expect("Unable to reset");
		assert_eq!(trace.expected_id(), 0);
		assert_eq!(trace.next_chunk_id(), 0);

		let first = trace.read_next().expect("Unable to read").expect("Missing record");
		assert_eq!(first.id(), 0);
		assert_eq!(first.chunk_id_start(), 0);
	}
}
