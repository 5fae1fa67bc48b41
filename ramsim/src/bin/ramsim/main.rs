//! Runs a trace through the dependency scheduler

// Modules
mod args;

// Imports
use {
	self::args::Args,
	anyhow::Context,
	clap::Parser,
	ramsim::{data, memory::FixedLatencyMemory, Config, Scheduler, Simulator, TraceDriver, TraceReader},
	ramsim_util::logger,
	std::fs,
};

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// Read the config file
	let config = Config::load(&args.config_file)?;
	tracing::debug!(?config, "Loaded config");
	let trace_path = args.trace_file.as_ref().unwrap_or(&config.trace_file_path);

	// Open the trace
	let trace = TraceReader::open(trace_path).context("Unable to open trace")?;
	let mut driver = TraceDriver::new(trace, Scheduler::new(config.scheduler_config()));
	let mut memory = FixedLatencyMemory::new(config.memory);

	// Run the simulator
	let mut sim = Simulator::new(config.clock_ratio, config.max_cycles, config.debug_output_period());
	let output = sim
		.run(&mut driver, &mut memory)
		.context("Unable to run simulator")?;

	let data = data::Data::new(&output, *memory.statistics());
	tracing::info!(
		cycles = data.cycles,
		memory_cycles = data.memory_cycles,
		reads = data.scheduler.read_chunks,
		writes = data.scheduler.write_chunks,
		retired = data.scheduler.retired,
		"Finished trace"
	);

	if let Some(output_path) = &args.output_file {
		let output_file = fs::File::create(output_path).context("Unable to create output file")?;
		serde_json::to_writer_pretty(output_file, &data).context("Unable to write to output file")?;
	}

	Ok(())
}
