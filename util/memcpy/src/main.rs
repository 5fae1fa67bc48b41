//! Runs a memcpy through the dependency scheduler

// Imports
use {
	anyhow::Context,
	clap::Parser,
	ramsim::{data, memory::FixedLatencyMemory, Config, MemCpyDriver, Scheduler, Simulator},
	ramsim_util::logger,
	std::{fs, path::PathBuf},
};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
struct Args {
	/// Log file
	#[clap(long = "log-file")]
	log_file: Option<PathBuf>,

	/// Whether to append to the log file
	#[clap(long = "log-file-append")]
	log_file_append: bool,

	/// Config file
	///
	/// The trace file in it is ignored.
	#[clap(long = "config")]
	config_file: PathBuf,

	/// Bytes to copy
	size: u64,

	/// Source address
	#[clap(long = "src", default_value_t = 0x1000_0000)]
	src: u64,

	/// Destination address
	#[clap(long = "dst", default_value_t = 0x2000_0000)]
	dst: u64,

	/// Output file
	#[clap(long = "output")]
	output_file: Option<PathBuf>,
}

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	let config = Config::load(&args.config_file)?;

	let mut driver = MemCpyDriver::new(Scheduler::new(config.scheduler_config()));
	driver
		.start(args.src, args.dst, args.size)
		.context("Unable to start memcpy")?;
	let mut memory = FixedLatencyMemory::new(config.memory);

	let mut sim = Simulator::new(config.clock_ratio, config.max_cycles, config.debug_output_period());
	let output = sim
		.run(&mut driver, &mut memory)
		.context("Unable to run simulator")?;

	let memory_statistics = *memory.statistics();
	tracing::info!(
		cycles = output.cycles,
		memory_cycles = output.memory_cycles,
		reads = memory_statistics.reads,
		writes = memory_statistics.writes,
		served = output.statistics.retired(),
		"Finished memcpy"
	);

	if let Some(output_path) = &args.output_file {
		let data = data::Data::new(&output, memory_statistics);
		let output_file = fs::File::create(output_path).context("Unable to create output file")?;
		serde_json::to_writer_pretty(output_file, &data).context("Unable to write to output file")?;
	}

	Ok(())
}
