//! Serializable view of the buffer set for external consumers.

use indexmap::IndexMap;
use serde::Serialize;

use crate::buffer::{lock, SharedBuffers};
use crate::stages::Stage;

/// `{"data": ...}` body handed to an HTTP or file collaborator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub data: SnapshotData,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotData {
    pub tick: u64,
    /// RFC 3339 time of the last completed tick.
    pub taken_at: Option<String>,
    /// Samples per metric, oldest first.
    pub metrics: IndexMap<String, Vec<f64>>,
    pub stages: Vec<&'static str>,
    /// One row per cycle, a stage name or `"Stall"` per column.
    pub pipeline: Vec<Vec<String>>,
}

/// Copy the current buffer contents out under the lock.
pub fn produce_current_snapshot(buffers: &SharedBuffers) -> PipelineSnapshot {
    let set = lock(buffers);
    let metrics = set
        .iter()
        .map(|(name, series)| (name.to_string(), series.samples().iter().copied().collect()))
        .collect();

    PipelineSnapshot {
        data: SnapshotData {
            tick: set.ticks(),
            taken_at: set.last_tick().map(|at| at.to_rfc3339()),
            metrics,
            stages: Stage::ALL.iter().map(|stage| stage.name()).collect(),
            pipeline: set.stages().map(|grid| grid.labels()).unwrap_or_default(),
        },
    }
}

impl PipelineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferSet;
    use crate::config::MonitorConfig;
    use crate::generator::DeterministicSequenceGenerator;
    use crate::producer::TickProducer;
    use crate::stages::{FixedStageSampler, StageState};

    #[test]
    fn empty_snapshot() {
        let buffers = BufferSet::new(["CPI", "IPC"], 20).unwrap().into_shared();
        let snapshot = produce_current_snapshot(&buffers);
        assert_eq!(snapshot.data.tick, 0);
        assert!(snapshot.data.taken_at.is_none());
        assert!(snapshot.data.pipeline.is_empty());
        assert_eq!(snapshot.data.metrics["CPI"], Vec::<f64>::new());
    }

    #[test]
    fn json_shape() {
        let config = MonitorConfig {
            stage_cycles: 2,
            ..MonitorConfig::default()
        };
        let buffers = BufferSet::from_config(&config).unwrap().into_shared();
        let mut producer = TickProducer::new(&config, buffers)
            .with_generator("CPI", Box::new(DeterministicSequenceGenerator::constant(1.25)))
            .unwrap()
            .with_generator("IPC", Box::new(DeterministicSequenceGenerator::constant(0.5)))
            .unwrap()
            .with_stage_sampler(Box::new(FixedStageSampler(StageState::Active)));
        producer.tick();

        let json = produce_current_snapshot(producer.buffers()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let data = &value["data"];
        assert_eq!(data["tick"], 1);
        assert_eq!(data["metrics"]["CPI"], serde_json::json!([1.25]));
        assert_eq!(data["metrics"]["IPC"], serde_json::json!([0.5]));
        assert_eq!(data["stages"][4], "WriteBack");
        assert_eq!(data["pipeline"].as_array().map(Vec::len), Some(2));
        assert_eq!(data["pipeline"][0][0], "Fetch");
        assert!(data["taken_at"].is_string());
        // metric order follows configuration
        assert!(json.find("\"CPI\"").unwrap() < json.find("\"IPC\"").unwrap());
    }
}
