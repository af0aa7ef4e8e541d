use std::time::Duration;

use chrono::{DateTime, Local};

use crate::buffer::{lock, SeriesStats, SharedBuffers};
use crate::stages::StageActivity;

// Copy of one series taken for a single frame
pub struct MetricView {
    pub name: String,
    pub samples: Vec<f64>,
    pub stats: Option<SeriesStats>,
    pub peak: Option<(f64, DateTime<Local>)>,
}

// Renderer-side state, refreshed from the shared buffers
pub struct App {
    buffers: SharedBuffers,
    pub metrics: Vec<MetricView>,
    pub stages: Option<StageActivity>,
    pub capacity: usize,
    pub ticks: u64,
    pub last_tick: Option<DateTime<Local>>,
    pub interval: Duration,
}

impl App {
    pub fn new(buffers: SharedBuffers, interval: Duration) -> App {
        let mut app = App {
            buffers,
            metrics: Vec::new(),
            stages: None,
            capacity: 0,
            ticks: 0,
            last_tick: None,
            interval,
        };
        app.sync(true);
        app
    }

    /// Pull new data if a tick completed since the last refresh.
    pub fn refresh(&mut self) -> bool {
        self.sync(false)
    }

    fn sync(&mut self, force: bool) -> bool {
        let set = lock(&self.buffers);
        if !force && set.ticks() == self.ticks {
            return false;
        }

        self.metrics = set
            .iter()
            .map(|(name, series)| MetricView {
                name: name.to_string(),
                samples: series.samples().iter().copied().collect(),
                stats: series.stats(),
                peak: series.peak(),
            })
            .collect();
        self.stages = set.stages().cloned();
        self.capacity = set.capacity();
        self.ticks = set.ticks();
        self.last_tick = set.last_tick();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferSet;

    #[test]
    fn refresh_only_after_tick() {
        let buffers = BufferSet::new(["CPI", "IPC"], 3).unwrap().into_shared();
        lock(&buffers).append("CPI", 1.0).unwrap();
        let mut app = App::new(buffers.clone(), Duration::from_millis(1000));
        assert_eq!(app.metrics.len(), 2);
        assert_eq!(app.metrics[0].samples, vec![1.0]);
        assert_eq!(app.capacity, 3);

        // appends without a completed tick are not picked up
        lock(&buffers).append("CPI", 2.0).unwrap();
        assert!(!app.refresh());
        assert_eq!(app.metrics[0].samples, vec![1.0]);

        let grid = StageActivity::generate(
            1,
            &mut crate::stages::FixedStageSampler(crate::stages::StageState::Active),
        );
        lock(&buffers).complete_tick(grid, Local::now());
        assert!(app.refresh());
        assert_eq!(app.metrics[0].samples, vec![1.0, 2.0]);
        assert_eq!(app.ticks, 1);
        assert!(app.stages.is_some());
    }
}
