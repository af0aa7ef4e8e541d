//! Value generators: the swap point between the tick producer and whatever
//! produces the numbers.
//!
//! [`UniformRandomGenerator`] is the default. [`DeterministicSequenceGenerator`]
//! replays fixed values for tests. [`SimulatedPipelineGenerator`] defers to an
//! attached [`PipelineModel`] and fails when none is attached.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::GeneratorError;

/// Closed numeric range `[min, max]` a metric is drawn from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Finite bounds, `min <= max`, and a width that does not overflow.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min <= self.max
            && (self.max - self.min).is_finite()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn check(&self) -> Result<(), GeneratorError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(GeneratorError::InvalidRange {
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Produces one sample for a metric on request.
pub trait ValueGenerator: Send {
    fn generate(&mut self, metric: &str, range: ValueRange) -> Result<f64, GeneratorError>;
}

/// Uniform draws over the metric's closed range.
pub struct UniformRandomGenerator {
    rng: StdRng,
}

impl UniformRandomGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible stream for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for UniformRandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueGenerator for UniformRandomGenerator {
    fn generate(&mut self, _metric: &str, range: ValueRange) -> Result<f64, GeneratorError> {
        range.check()?;
        Ok(self.rng.gen_range(range.min..=range.max))
    }
}

/// Cycles through a fixed list of values, ignoring the range.
pub struct DeterministicSequenceGenerator {
    values: Vec<f64>,
    pos: usize,
}

impl DeterministicSequenceGenerator {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, pos: 0 }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl ValueGenerator for DeterministicSequenceGenerator {
    fn generate(&mut self, _metric: &str, _range: ValueRange) -> Result<f64, GeneratorError> {
        if self.values.is_empty() {
            return Err(GeneratorError::Exhausted);
        }
        let value = self.values[self.pos];
        self.pos = (self.pos + 1) % self.values.len();
        Ok(value)
    }
}

/// A source of metric values derived from an instruction-pipeline model.
///
/// Returning `None` means the model has no value for that metric.
pub trait PipelineModel: Send {
    fn sample(&mut self, metric: &str) -> Option<f64>;
}

/// Generator backed by a [`PipelineModel`].
///
/// No model ships with this crate, so a generator built with [`new`](Self::new)
/// reports [`GeneratorError::Unavailable`] on every draw.
#[derive(Default)]
pub struct SimulatedPipelineGenerator {
    model: Option<Box<dyn PipelineModel>>,
}

impl SimulatedPipelineGenerator {
    pub fn new() -> Self {
        Self { model: None }
    }

    pub fn with_model(model: Box<dyn PipelineModel>) -> Self {
        Self { model: Some(model) }
    }
}

impl ValueGenerator for SimulatedPipelineGenerator {
    fn generate(&mut self, metric: &str, _range: ValueRange) -> Result<f64, GeneratorError> {
        self.model
            .as_mut()
            .and_then(|model| model.sample(metric))
            .ok_or_else(|| GeneratorError::Unavailable {
                metric: metric.to_string(),
            })
    }
}
