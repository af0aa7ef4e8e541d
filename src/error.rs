//! Error types for the buffer, the value generators and configuration.

use thiserror::Error;

/// Errors raised by [`BufferSet`](crate::buffer::BufferSet) operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("metric {name:?} is not tracked")]
    InvalidMetric { name: String },

    #[error("sample {value} for metric {name:?} is not a finite number")]
    NonFiniteSample { name: String, value: f64 },
}

/// Errors raised by a [`ValueGenerator`](crate::generator::ValueGenerator).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("invalid value range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    #[error("value sequence is empty")]
    Exhausted,

    #[error("no pipeline model is attached for metric {metric:?}")]
    Unavailable { metric: String },
}

/// A generator failure for one metric during one tick.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("generator for metric {metric:?} failed: {source}")]
pub struct TickFailure {
    pub metric: String,
    #[source]
    pub source: GeneratorError,
}

/// Configuration errors detected at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("max series length must be at least 1")]
    ZeroCapacity,

    #[error("tick interval must be at least 1 ms")]
    ZeroInterval,

    #[error("no metrics configured")]
    NoMetrics,

    #[error("metric {name:?} configured more than once")]
    DuplicateMetric { name: String },

    #[error("range for metric {name:?} is invalid: [{min}, {max}]")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("cannot parse range {input:?}, expected NAME=MIN:MAX")]
    BadRangeSyntax { input: String },

    #[error("stall probability {value} is outside [0, 1]")]
    InvalidStallProbability { value: f64 },

    #[error("stage grid needs at least one cycle")]
    ZeroCycles,
}
