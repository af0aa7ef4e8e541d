//! Rolling metric history.
//!
//! A [`BufferSet`] owns one bounded [`MetricSeries`] per tracked metric. The
//! set of metrics is fixed when the buffer set is built; appends to any other
//! name fail with [`BufferError::InvalidMetric`] and leave every series
//! untouched. Each series keeps at most `capacity` samples, oldest first, and
//! evicts exactly one sample from the front when a push overflows it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use indexmap::IndexMap;

use crate::config::MonitorConfig;
use crate::error::{BufferError, ConfigError};
use crate::stages::StageActivity;

/// Buffer set shared between the tick producer and its readers.
pub type SharedBuffers = Arc<Mutex<BufferSet>>;

/// Lock the shared buffer set.
///
/// Every mutation leaves the set consistent, so a poisoned lock is recovered
/// rather than propagated.
pub fn lock(buffers: &SharedBuffers) -> MutexGuard<'_, BufferSet> {
    buffers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Summary of the samples currently retained by a series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeriesStats {
    pub latest: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

// Single metric history record
#[derive(Clone, Debug)]
pub struct MetricSeries {
    samples: VecDeque<f64>,
    capacity: usize,
    peak: Option<(f64, DateTime<Local>)>,
}

impl MetricSeries {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
            peak: None,
        }
    }

    fn push(&mut self, value: f64) -> Option<f64> {
        if self.peak.map_or(true, |(peak, _)| value > peak) {
            self.peak = Some((value, Local::now()));
        }

        self.samples.push_back(value);
        if self.samples.len() > self.capacity {
            self.samples.pop_front()
        } else {
            None
        }
    }

    pub fn samples(&self) -> &VecDeque<f64> {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `None` until the first sample arrives.
    pub fn stats(&self) -> Option<SeriesStats> {
        let latest = *self.samples.back()?;
        let (min, max, sum) = self
            .samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY, 0.0), |(lo, hi, sum), &v| {
                (lo.min(v), hi.max(v), sum + v)
            });
        Some(SeriesStats {
            latest,
            min,
            max,
            mean: sum / self.samples.len() as f64,
        })
    }

    /// Highest sample ever appended, including evicted ones.
    pub fn peak(&self) -> Option<(f64, DateTime<Local>)> {
        self.peak
    }
}

/// The closed set of tracked metric series plus the latest stage grid.
#[derive(Clone, Debug)]
pub struct BufferSet {
    series: IndexMap<String, MetricSeries>,
    capacity: usize,
    stages: Option<StageActivity>,
    ticks: u64,
    last_tick: Option<DateTime<Local>>,
}

impl BufferSet {
    /// Build a buffer set tracking `metrics`, each bounded to `capacity`.
    pub fn new<I, S>(metrics: I, capacity: usize) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let mut series = IndexMap::new();
        for name in metrics {
            let name = name.into();
            if series.contains_key(&name) {
                return Err(ConfigError::DuplicateMetric { name });
            }
            series.insert(name, MetricSeries::new(capacity));
        }
        if series.is_empty() {
            return Err(ConfigError::NoMetrics);
        }

        Ok(Self {
            series,
            capacity,
            stages: None,
            ticks: 0,
            last_tick: None,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        Self::new(config.value_ranges.keys().cloned(), config.max_series_length)
    }

    pub fn into_shared(self) -> SharedBuffers {
        Arc::new(Mutex::new(self))
    }

    /// Append `value` as the newest sample of `metric`.
    ///
    /// Returns the evicted sample when the series was already full.
    pub fn append(&mut self, metric: &str, value: f64) -> Result<Option<f64>, BufferError> {
        let series = self
            .series
            .get_mut(metric)
            .ok_or_else(|| BufferError::InvalidMetric {
                name: metric.to_string(),
            })?;
        if !value.is_finite() {
            return Err(BufferError::NonFiniteSample {
                name: metric.to_string(),
                value,
            });
        }
        Ok(series.push(value))
    }

    /// Samples of `metric`, oldest first.
    pub fn snapshot(&self, metric: &str) -> Result<Vec<f64>, BufferError> {
        self.series(metric)
            .map(|series| series.samples.iter().copied().collect())
    }

    pub fn series(&self, metric: &str) -> Result<&MetricSeries, BufferError> {
        self.series
            .get(metric)
            .ok_or_else(|| BufferError::InvalidMetric {
                name: metric.to_string(),
            })
    }

    pub fn stats(&self, metric: &str) -> Result<Option<SeriesStats>, BufferError> {
        self.series(metric).map(MetricSeries::stats)
    }

    /// Tracked metric names in configuration order.
    pub fn tracked_metrics(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricSeries)> {
        self.series.iter().map(|(name, series)| (name.as_str(), series))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record the end of one tick along with its stage grid.
    pub fn complete_tick(&mut self, stages: StageActivity, at: DateTime<Local>) {
        self.stages = Some(stages);
        self.ticks += 1;
        self.last_tick = Some(at);
    }

    pub fn stages(&self) -> Option<&StageActivity> {
        self.stages.as_ref()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_tick(&self) -> Option<DateTime<Local>> {
        self.last_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FixedStageSampler, StageState};
    use proptest::prelude::*;

    fn cpi_ipc(capacity: usize) -> BufferSet {
        BufferSet::new(["CPI", "IPC"], capacity).unwrap()
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut set = cpi_ipc(3);
        for v in [1.0, 2.0, 3.0] {
            assert_eq!(set.append("CPI", v), Ok(None));
        }
        assert_eq!(set.append("CPI", 4.0), Ok(Some(1.0)));
        assert_eq!(set.snapshot("CPI").unwrap(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn fresh_series_is_empty() {
        let set = cpi_ipc(20);
        assert_eq!(set.snapshot("IPC").unwrap(), Vec::<f64>::new());
        assert_eq!(set.stats("IPC"), Ok(None));
        assert!(set.series("IPC").unwrap().peak().is_none());
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let mut set = cpi_ipc(3);
        set.append("CPI", 1.0).unwrap();

        let err = set.append("MIPS", 1.0).unwrap_err();
        assert_eq!(
            err,
            BufferError::InvalidMetric {
                name: "MIPS".to_string()
            }
        );
        assert!(set.snapshot("MIPS").is_err());
        assert_eq!(set.snapshot("CPI").unwrap(), vec![1.0]);
        assert!(set.snapshot("IPC").unwrap().is_empty());
        assert_eq!(set.tracked_metrics(), vec!["CPI", "IPC"]);
    }

    #[test]
    fn non_finite_sample_is_rejected() {
        let mut set = cpi_ipc(3);
        assert!(matches!(
            set.append("CPI", f64::NAN),
            Err(BufferError::NonFiniteSample { .. })
        ));
        assert!(set.append("CPI", f64::INFINITY).is_err());
        assert!(set.snapshot("CPI").unwrap().is_empty());
    }

    #[test]
    fn stats_cover_retained_window() {
        let mut set = cpi_ipc(3);
        for v in [5.0, 1.0, 2.0, 3.0] {
            set.append("CPI", v).unwrap();
        }
        let stats = set.stats("CPI").unwrap().unwrap();
        assert_eq!(stats.latest, 3.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        // peak remembers the evicted 5.0
        assert_eq!(set.series("CPI").unwrap().peak().map(|(v, _)| v), Some(5.0));
    }

    #[test]
    fn construction_errors() {
        assert_eq!(
            BufferSet::new(["CPI"], 0).unwrap_err(),
            ConfigError::ZeroCapacity
        );
        assert_eq!(
            BufferSet::new(Vec::<String>::new(), 3).unwrap_err(),
            ConfigError::NoMetrics
        );
        assert_eq!(
            BufferSet::new(["CPI", "CPI"], 3).unwrap_err(),
            ConfigError::DuplicateMetric {
                name: "CPI".to_string()
            }
        );
    }

    #[test]
    fn complete_tick_keeps_tracked_set() {
        let mut set = cpi_ipc(3);
        set.append("CPI", 1.0).unwrap();
        set.append("IPC", 1.0).unwrap();
        let grid = StageActivity::generate(2, &mut FixedStageSampler(StageState::Active));
        set.complete_tick(grid, Local::now());

        assert_eq!(set.ticks(), 1);
        assert!(set.last_tick().is_some());
        assert_eq!(set.stages().map(StageActivity::cycles), Some(2));
        assert_eq!(set.tracked_metrics(), vec!["CPI", "IPC"]);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let shared = cpi_ipc(3).into_shared();
        let poisoner = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the buffer lock");
        })
        .join();

        assert!(shared.is_poisoned());
        lock(&shared).append("CPI", 1.5).unwrap();
        assert_eq!(lock(&shared).snapshot("CPI").unwrap(), vec![1.5]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Append(usize, f64),
        Unknown(f64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0usize..2, 0.0f64..10.0).prop_map(|(m, v)| Op::Append(m, v)),
            1 => (0.0f64..10.0).prop_map(Op::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity(
            capacity in 1usize..8,
            ops in prop::collection::vec(arb_op(), 0..64),
        ) {
            let mut set = cpi_ipc(capacity);
            let names = ["CPI", "IPC"];
            for op in ops {
                match op {
                    Op::Append(m, v) => {
                        let before = set.snapshot(names[m]).unwrap();
                        let evicted = set.append(names[m], v).unwrap();
                        let after = set.snapshot(names[m]).unwrap();

                        prop_assert_eq!(after.len(), (before.len() + 1).min(capacity));
                        prop_assert_eq!(*after.last().unwrap(), v);
                        if before.len() == capacity {
                            // exactly the front sample leaves
                            prop_assert_eq!(evicted, Some(before[0]));
                            prop_assert_eq!(&after[..capacity - 1], &before[1..]);
                        } else {
                            prop_assert_eq!(evicted, None);
                            prop_assert_eq!(&after[..before.len()], &before[..]);
                        }
                    }
                    Op::Unknown(v) => {
                        let before: Vec<Vec<f64>> =
                            names.iter().map(|n| set.snapshot(n).unwrap()).collect();
                        let rejected = matches!(
                            set.append("L1_MISS", v),
                            Err(BufferError::InvalidMetric { .. })
                        );
                        prop_assert!(rejected);
                        let after: Vec<Vec<f64>> =
                            names.iter().map(|n| set.snapshot(n).unwrap()).collect();
                        prop_assert_eq!(before, after);
                    }
                }
                for name in names {
                    prop_assert!(set.snapshot(name).unwrap().len() <= capacity);
                }
            }
        }

        #[test]
        fn snapshot_is_idempotent(values in prop::collection::vec(0.5f64..1.5, 0..40)) {
            let mut set = cpi_ipc(20);
            for v in values {
                set.append("IPC", v).unwrap();
            }
            prop_assert_eq!(set.snapshot("IPC"), set.snapshot("IPC"));
        }
    }
}
