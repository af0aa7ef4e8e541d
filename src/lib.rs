//! Rolling CPU pipeline metrics: a bounded per-metric history fed by a tick
//! producer, with swappable value generators and a terminal dashboard.

pub mod app;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod error;
pub mod generator;
pub mod producer;
pub mod snapshot;
pub mod stages;
pub mod ui;
pub mod util;

pub use buffer::{BufferSet, SharedBuffers};
pub use config::{Cli, GeneratorKind, MonitorConfig};
pub use error::{BufferError, ConfigError, GeneratorError, TickFailure};
pub use generator::{
    DeterministicSequenceGenerator, PipelineModel, SimulatedPipelineGenerator,
    UniformRandomGenerator, ValueGenerator, ValueRange,
};
pub use producer::{ProducerHandle, TickProducer, TickReport};
pub use snapshot::{produce_current_snapshot, PipelineSnapshot};
