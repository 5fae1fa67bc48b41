//! Configuration

// Imports
use {
	crate::{memory::MemoryConfig, scheduler::SchedulerConfig, Cycle},
	anyhow::Context,
	std::{fs, io, path::PathBuf, time::Duration},
};

/// Configuration
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
	/// Maximum requests pending or completed at once
	#[serde(alias = "maxOutstanding")]
	pub max_outstanding: usize,

	/// Trace file
	#[serde(alias = "traceFilePath")]
	pub trace_file_path: PathBuf,

	/// Memory cycles per frontend cycle
	#[serde(alias = "clockRatio")]
	#[serde(default = "default_clock_ratio")]
	pub clock_ratio: u64,

	/// Whether to log every scheduling event
	#[serde(alias = "enableLogging")]
	#[serde(default)]
	pub enable_logging: bool,

	/// Maximum frontend cycles before giving up
	#[serde(alias = "maxCycles")]
	#[serde(default)]
	pub max_cycles: Option<Cycle>,

	/// Debug output period (in seconds)
	#[serde(default = "default_debug_output_period_secs")]
	pub debug_output_period_secs: f64,

	/// Memory configuration
	#[serde(default)]
	pub memory: MemoryConfig,
}

fn default_clock_ratio() -> u64 {
	1
}

fn default_debug_output_period_secs() -> f64 {
	1.0
}

impl Config {
	/// Loads and validates the config at `path`
	pub fn load(path: impl Into<PathBuf>) -> Result<Self, anyhow::Error> {
		let path = path.into();
		let file = fs::File::open(&path).with_context(|| format!("Unable to open config file {path:?}"))?;
		Self::from_reader(io::BufReader::new(file)).with_context(|| format!("Unable to load config file {path:?}"))
	}

	/// Parses and validates a config from `reader`
	pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, anyhow::Error> {
		let config = serde_json::from_reader::<_, Self>(reader).context("Unable to parse config")?;
		config.validate()?;

		Ok(config)
	}

	/// Validates this config
	pub fn validate(&self) -> Result<(), anyhow::Error> {
		anyhow::ensure!(self.clock_ratio >= 1, "Clock ratio must be at least 1");
		anyhow::ensure!(
			self.debug_output_period_secs.is_finite() && self.debug_output_period_secs >= 0.0,
			"Debug output period must be a non-negative number of seconds, found {}",
			self.debug_output_period_secs
		);
		anyhow::ensure!(self.memory.queue_capacity > 0, "Memory queue capacity must be at least 1");
		anyhow::ensure!(
			self.memory.accepts_per_cycle > 0,
			"Memory accepts per cycle must be at least 1"
		);
		if self.max_outstanding == 0 {
			tracing::warn!("Max outstanding is 0, no request will ever be admitted");
		}

		Ok(())
	}

	/// Returns the scheduler configuration
	pub fn scheduler_config(&self) -> SchedulerConfig {
		SchedulerConfig {
			max_outstanding: self.max_outstanding,
			source_id:       0,
			enable_logging:  self.enable_logging,
		}
	}

	/// Returns the debug output period
	pub fn debug_output_period(&self) -> Duration {
		Duration::from_secs_f64(self.debug_output_period_secs)
	}
}
