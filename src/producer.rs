//! Tick producer: draws one value per tracked metric and appends them.
//!
//! Generators run without the buffer lock. The lock is taken once per tick,
//! only to append the draws and store the new stage grid. A failing generator
//! skips its own metric for that tick and nothing else.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::buffer::{lock, SharedBuffers};
use crate::config::{GeneratorKind, MonitorConfig};
use crate::error::{BufferError, TickFailure};
use crate::generator::{
    SimulatedPipelineGenerator, UniformRandomGenerator, ValueGenerator, ValueRange,
};
use crate::stages::{RandomStageSampler, StageActivity, StageSampler};

// Longest single sleep, bounds how long stop() takes to be noticed
const SLEEP_SLICE: Duration = Duration::from_millis(20);

struct MetricSource {
    range: ValueRange,
    generator: Box<dyn ValueGenerator>,
    // Set while the generator keeps failing; repeats log at debug
    failing: bool,
}

impl MetricSource {
    fn record_failure(&mut self, metric: &str, err: &dyn fmt::Display) {
        if self.failing {
            debug!("skipping {metric} again: {err}");
        } else {
            warn!("skipping {metric} until it recovers: {err}");
            self.failing = true;
        }
    }

    fn record_success(&mut self, metric: &str) {
        if self.failing {
            info!("{metric} recovered");
            self.failing = false;
        }
    }
}

/// Outcome of one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub appended: Vec<String>,
    pub failures: Vec<TickFailure>,
    pub rejected: Vec<BufferError>,
}

pub struct TickProducer {
    buffers: SharedBuffers,
    sources: IndexMap<String, MetricSource>,
    stage_sampler: Box<dyn StageSampler>,
    stage_cycles: usize,
    interval: Duration,
}

impl TickProducer {
    /// One generator per configured metric, of the configured kind.
    pub fn new(config: &MonitorConfig, buffers: SharedBuffers) -> Self {
        let sources = config
            .value_ranges
            .iter()
            .enumerate()
            .map(|(i, (name, &range))| {
                let generator: Box<dyn ValueGenerator> = match config.generator {
                    GeneratorKind::Uniform => match config.seed {
                        Some(seed) => {
                            Box::new(UniformRandomGenerator::with_seed(seed.wrapping_add(i as u64)))
                        }
                        None => Box::new(UniformRandomGenerator::new()),
                    },
                    GeneratorKind::Simulated => Box::new(SimulatedPipelineGenerator::new()),
                };
                let source = MetricSource {
                    range,
                    generator,
                    failing: false,
                };
                (name.clone(), source)
            })
            .collect::<IndexMap<_, _>>();
        let stage_seed = config
            .seed
            .map(|seed| seed.wrapping_add(sources.len() as u64));

        Self {
            buffers,
            sources,
            stage_sampler: Box::new(RandomStageSampler::new(
                config.stall_probability,
                stage_seed,
            )),
            stage_cycles: config.stage_cycles,
            interval: config.interval(),
        }
    }

    /// Replace the generator of a configured metric.
    pub fn with_generator(
        mut self,
        metric: &str,
        generator: Box<dyn ValueGenerator>,
    ) -> Result<Self, BufferError> {
        let source = self
            .sources
            .get_mut(metric)
            .ok_or_else(|| BufferError::InvalidMetric {
                name: metric.to_string(),
            })?;
        source.generator = generator;
        source.failing = false;
        Ok(self)
    }

    pub fn with_stage_sampler(mut self, sampler: Box<dyn StageSampler>) -> Self {
        self.stage_sampler = sampler;
        self
    }

    pub fn buffers(&self) -> &SharedBuffers {
        &self.buffers
    }

    fn draw(&mut self) -> (Vec<(String, f64)>, Vec<TickFailure>) {
        let mut draws = Vec::with_capacity(self.sources.len());
        let mut failures = Vec::new();
        for (metric, source) in self.sources.iter_mut() {
            match source.generator.generate(metric, source.range) {
                Ok(value) => draws.push((metric.clone(), value)),
                Err(err) => {
                    source.record_failure(metric, &err);
                    failures.push(TickFailure {
                        metric: metric.clone(),
                        source: err,
                    });
                }
            }
        }
        (draws, failures)
    }

    // Appends under one lock; `stages` completes the tick when present
    fn append_draws(
        &mut self,
        draws: Vec<(String, f64)>,
        report: &mut TickReport,
        stages: Option<StageActivity>,
    ) -> u64 {
        let mut set = lock(&self.buffers);
        for (metric, value) in draws {
            let result = set.append(&metric, value);
            let Some(source) = self.sources.get_mut(&metric) else {
                continue;
            };
            match result {
                Ok(_) => {
                    source.record_success(&metric);
                    report.appended.push(metric);
                }
                Err(err) => {
                    source.record_failure(&metric, &err);
                    report.rejected.push(err);
                }
            }
        }
        if let Some(stages) = stages {
            set.complete_tick(stages, Local::now());
        }
        set.ticks()
    }

    /// Run one generate-and-append cycle.
    pub fn tick(&mut self) -> TickReport {
        let (draws, failures) = self.draw();
        let stages = StageActivity::generate(self.stage_cycles, self.stage_sampler.as_mut());

        let mut report = TickReport {
            failures,
            ..TickReport::default()
        };
        let tick = self.append_draws(draws, &mut report, Some(stages));

        debug!(
            "tick {tick}: appended {:?}, {} failed",
            report.appended,
            report.failures.len()
        );
        report
    }

    /// Fill every series to capacity without counting a tick.
    pub fn prefill(&mut self) -> TickReport {
        let capacity = lock(&self.buffers).capacity();
        let mut report = TickReport::default();
        for _ in 0..capacity {
            let (draws, failures) = self.draw();
            report.failures.extend(failures);
            self.append_draws(draws, &mut report, None);
        }
        info!("prefilled {} samples", report.appended.len());
        report
    }

    /// Tick on a background thread every `interval` until `stop` is set.
    pub fn spawn(mut self, stop: Arc<AtomicBool>) -> io::Result<ProducerHandle> {
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("tick-producer".to_string())
            .spawn(move || {
                let interval = self.interval;
                info!("tick producer started, interval {interval:?}");
                let mut deadline = Instant::now() + interval;
                while !flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < deadline {
                        thread::sleep((deadline - now).min(SLEEP_SLICE));
                        continue;
                    }
                    self.tick();
                    deadline += interval;
                    // Missed ticks are dropped, not replayed
                    let now = Instant::now();
                    if deadline < now {
                        deadline = now + interval;
                    }
                }
                info!("tick producer stopped after {} ticks", lock(&self.buffers).ticks());
            })?;

        Ok(ProducerHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to a running producer thread. Dropping it stops and joins.
pub struct ProducerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ProducerHandle {
    /// Stop scheduling further ticks. An in-flight tick runs to completion.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn join(mut self) -> thread::Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
