//! Generates a synthetic trace.
//!
//! Records are split into groups of `dep-count` records, and every record
//! depends on the previous group.

// Imports
use {
	anyhow::Context,
	clap::Parser,
	rand::Rng,
	ramsim::{trace::Record, OpKind, TraceWriter},
	ramsim_util::logger,
	std::{fs, io::BufWriter, path::PathBuf},
};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
struct Args {
	/// Group size.
	///
	/// Each record depends on the last `dep-count - 1` records of the previous group.
	#[clap(value_parser = clap::value_parser!(u64).range(1..))]
	dep_count: u64,

	/// Output file
	output: PathBuf,

	/// Number of records
	#[clap(long = "records", default_value_t = 100)]
	records: u64,

	/// Make every `N`th record a write (0 for only reads)
	#[clap(long = "write-every", default_value_t = 0)]
	write_every: u64,

	/// Access size, in bytes
	#[clap(long = "size", default_value_t = 64)]
	#[clap(value_parser = clap::value_parser!(u64).range(1..))]
	size: u64,

	/// Extra delay of every record
	#[clap(long = "delay", default_value_t = 0)]
	delay: u64,

	/// Adds a random extra delay, up to this value, to every record
	#[clap(long = "random-delay")]
	random_delay: Option<u64>,
}

/// Base address of the first record
const BASE_ADDR: u64 = 0x1000;

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(None, false);

	let file = fs::File::create(&args.output).context("Unable to create output file")?;
	let mut writer = TraceWriter::new(BufWriter::new(file)).context("Unable to create trace writer")?;

	let mut rng = rand::thread_rng();
	for id in 0..args.records {
		let kind = match args.write_every {
			0 => OpKind::Read,
			write_every if (id + 1) % write_every == 0 => OpKind::Write,
			_ => OpKind::Read,
		};
		let delay = args.delay.saturating_add(args.random_delay.map_or(0, |max| rng.gen_range(0..=max)));
		let addr = self::record_addr(id, args.size).with_context(|| format!("Address of record {id} overflows"))?;

		let record = Record {
			id,
			addr,
			kind,
			delay,
			byte_size: args.size,
			deps: self::group_deps(id, args.dep_count),
		};
		tracing::trace!(?record, "Generated record");
		writer.write(&record).context("Unable to write record")?;
	}

	let records_written = writer.records_written();
	writer.finish().context("Unable to finish writing trace")?;
	tracing::info!(records_written, output = ?args.output, "Wrote trace");

	Ok(())
}

/// Returns the address of record `id`, if it fits the address space
fn record_addr(id: u64, size: u64) -> Option<u64> {
	id.checked_mul(size)
		.and_then(|offset| BASE_ADDR.checked_add(offset))
}

/// Returns the dependencies of record `id` with groups of `dep_count` records
fn group_deps(id: u64, dep_count: u64) -> Vec<u64> {
	if id < dep_count {
		return vec![];
	}

	let group_start = id / dep_count * dep_count;
	(1..dep_count).map(|dep| group_start - dep).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_group_has_no_deps() {
		for id in 0..4 {
			assert!(group_deps(id, 4).is_empty());
		}
	}

	#[test]
	fn deps_on_previous_group() {
		assert_eq!(group_deps(4, 4), [3, 2, 1]);
		assert_eq!(group_deps(7, 4), [3, 2, 1]);
		assert_eq!(group_deps(8, 4), [7, 6, 5]);
	}

	#[test]
	fn record_addresses() {
		assert_eq!(record_addr(0, 64), Some(0x1000));
		assert_eq!(record_addr(3, 64), Some(0x10c0));
		assert_eq!(record_addr(2, u64::MAX / 2), None);
		assert_eq!(record_addr(1, u64::MAX - 0x1000), Some(u64::MAX));
		assert_eq!(record_addr(1, u64::MAX - 0xfff), None);
	}

	#[test]
	fn single_record_groups_are_independent() {
		assert!((0..10).all(|id| group_deps(id, 1).is_empty()));
	}
}
