//! Command-line options and the validated monitor configuration.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use indexmap::IndexMap;

use crate::constants::{
    DEFAULT_RANGES, MAX_SERIES_LEN, STAGE_CYCLES, STALL_PROBABILITY, TICK_RATE_MS,
};
use crate::error::ConfigError;
use crate::generator::ValueRange;

/// Which generator feeds every tracked metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GeneratorKind {
    /// Uniform random draws over each metric's range.
    Uniform,
    /// Pipeline-model backed values (no model is bundled).
    Simulated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    pub max_series_length: usize,
    pub value_ranges: IndexMap<String, ValueRange>,
    pub generator: GeneratorKind,
    pub seed: Option<u64>,
    pub stage_cycles: usize,
    pub stall_probability: f64,
    /// Fill every series to capacity before the first tick.
    pub prefill: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: TICK_RATE_MS,
            max_series_length: MAX_SERIES_LEN,
            value_ranges: default_ranges(),
            generator: GeneratorKind::Uniform,
            seed: None,
            stage_cycles: STAGE_CYCLES,
            stall_probability: STALL_PROBABILITY,
            prefill: false,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.max_series_length == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.value_ranges.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        for (name, range) in &self.value_ranges {
            if !range.is_valid() {
                return Err(ConfigError::InvalidRange {
                    name: name.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
        }
        if self.stage_cycles == 0 {
            return Err(ConfigError::ZeroCycles);
        }
        if !(0.0..=1.0).contains(&self.stall_probability) {
            return Err(ConfigError::InvalidStallProbability {
                value: self.stall_probability,
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_ranges() -> IndexMap<String, ValueRange> {
    DEFAULT_RANGES
        .iter()
        .map(|&(name, min, max)| (name.to_string(), ValueRange::new(min, max)))
        .collect()
}

/// Parse `NAME=MIN:MAX`.
pub fn parse_range(input: &str) -> Result<(String, ValueRange), ConfigError> {
    let bad = || ConfigError::BadRangeSyntax {
        input: input.to_string(),
    };
    let (name, bounds) = input.split_once('=').ok_or_else(bad)?;
    let (min, max) = bounds.split_once(':').ok_or_else(bad)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(bad());
    }
    let min: f64 = min.trim().parse().map_err(|_| bad())?;
    let max: f64 = max.trim().parse().map_err(|_| bad())?;
    Ok((name.to_string(), ValueRange::new(min, max)))
}

#[derive(Parser, Debug)]
#[command(
    name = "pipeline_monitor",
    about = "Terminal dashboard of rolling CPU pipeline metrics"
)]
pub struct Cli {
    /// Time between ticks in milliseconds.
    #[arg(long, default_value_t = TICK_RATE_MS)]
    pub interval_ms: u64,

    /// Number of samples kept per metric.
    #[arg(long = "max-len", default_value_t = MAX_SERIES_LEN)]
    pub max_len: usize,

    /// Tracked metric and its range, repeatable. Defaults to CPI=0.8:2.0 and IPC=0.5:1.5.
    #[arg(long = "range", value_name = "NAME=MIN:MAX")]
    pub ranges: Vec<String>,

    #[arg(long, value_enum, default_value_t = GeneratorKind::Uniform)]
    pub generator: GeneratorKind,

    /// Seed for reproducible random draws.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Probability that a stage stalls in a given cycle.
    #[arg(long = "stall-prob", default_value_t = STALL_PROBABILITY)]
    pub stall_prob: f64,

    /// Fill the series to capacity on startup.
    #[arg(long)]
    pub seeded: bool,

    /// Run without the terminal UI and print a JSON snapshot at the end.
    #[arg(long)]
    pub headless: bool,

    /// Ticks to run in headless mode.
    #[arg(long, default_value_t = 10)]
    pub ticks: u64,
}

impl Cli {
    pub fn to_config(&self) -> Result<MonitorConfig, ConfigError> {
        let value_ranges = if self.ranges.is_empty() {
            default_ranges()
        } else {
            let mut ranges = IndexMap::new();
            for input in &self.ranges {
                let (name, range) = parse_range(input)?;
                if ranges.contains_key(&name) {
                    return Err(ConfigError::DuplicateMetric { name });
                }
                ranges.insert(name, range);
            }
            ranges
        };

        let config = MonitorConfig {
            interval_ms: self.interval_ms,
            max_series_length: self.max_len,
            value_ranges,
            generator: self.generator,
            seed: self.seed,
            stage_cycles: STAGE_CYCLES,
            stall_probability: self.stall_prob,
            prefill: self.seeded,
        };
        config.validate()?;
        Ok(config)
    }

    /// Default log filter when `RUST_LOG` is unset. The terminal UI shares
    /// stderr with the log, so only errors are shown there.
    pub fn log_filter(&self) -> &'static str {
        if self.headless {
            "warn"
        } else {
            "error"
        }
    }
}
