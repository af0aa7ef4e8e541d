//! Stage-activity grid shown as the pipeline heatmap.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::STALL_PROBABILITY;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Decode,
    Execute,
    Memory,
    WriteBack,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Fetch,
        Stage::Decode,
        Stage::Execute,
        Stage::Memory,
        Stage::WriteBack,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Fetch => "Fetch",
            Stage::Decode => "Decode",
            Stage::Execute => "Execute",
            Stage::Memory => "Memory",
            Stage::WriteBack => "WriteBack",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageState {
    Active,
    Stall,
}

/// Decides whether a stage is active or stalled for one cycle.
pub trait StageSampler: Send {
    fn sample(&mut self, cycle: usize, stage: Stage) -> StageState;
}

/// Each cell stalls independently with a fixed probability.
pub struct RandomStageSampler {
    rng: StdRng,
    stall_probability: f64,
}

impl RandomStageSampler {
    /// `stall_probability` is clamped to `[0, 1]`; NaN falls back to the default.
    pub fn new(stall_probability: f64, seed: Option<u64>) -> Self {
        let stall_probability = if stall_probability.is_nan() {
            STALL_PROBABILITY
        } else {
            stall_probability.clamp(0.0, 1.0)
        };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            stall_probability,
        }
    }
}

impl StageSampler for RandomStageSampler {
    fn sample(&mut self, _cycle: usize, _stage: Stage) -> StageState {
        if self.rng.gen_bool(self.stall_probability) {
            StageState::Stall
        } else {
            StageState::Active
        }
    }
}

/// Always returns the same state.
pub struct FixedStageSampler(pub StageState);

impl StageSampler for FixedStageSampler {
    fn sample(&mut self, _cycle: usize, _stage: Stage) -> StageState {
        self.0
    }
}

/// `cycles x stages` grid, row 0 is the oldest cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct StageActivity {
    rows: Vec<[StageState; 5]>,
}

impl StageActivity {
    pub fn generate(cycles: usize, sampler: &mut dyn StageSampler) -> Self {
        let rows = (0..cycles)
            .map(|cycle| Stage::ALL.map(|stage| sampler.sample(cycle, stage)))
            .collect();
        Self { rows }
    }

    pub fn cycles(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[[StageState; 5]] {
        &self.rows
    }

    pub fn state(&self, cycle: usize, stage: Stage) -> Option<StageState> {
        let col = Stage::ALL.iter().position(|s| *s == stage)?;
        self.rows.get(cycle).map(|row| row[col])
    }

    /// Fraction of cycles in which `stage` was active.
    pub fn utilisation(&self, stage: Stage) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let active = (0..self.rows.len())
            .filter(|&cycle| self.state(cycle, stage) == Some(StageState::Active))
            .count();
        active as f64 / self.rows.len() as f64
    }

    /// Cell labels: the stage name when active, `"Stall"` otherwise.
    pub fn labels(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(Stage::ALL)
                    .map(|(state, stage)| match state {
                        StageState::Active => stage.name().to_string(),
                        StageState::Stall => "Stall".to_string(),
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sampler_fills_grid() {
        let grid = StageActivity::generate(4, &mut FixedStageSampler(StageState::Stall));
        assert_eq!(grid.cycles(), 4);
        assert!(grid
            .rows()
            .iter()
            .all(|row| row.iter().all(|s| *s == StageState::Stall)));
        assert_eq!(grid.utilisation(Stage::Execute), 0.0);
    }

    #[test]
    fn probability_bounds() {
        let mut never = RandomStageSampler::new(0.0, Some(3));
        let grid = StageActivity::generate(20, &mut never);
        for stage in Stage::ALL {
            assert_eq!(grid.utilisation(stage), 1.0);
        }

        let mut always = RandomStageSampler::new(1.0, Some(3));
        let grid = StageActivity::generate(20, &mut always);
        for stage in Stage::ALL {
            assert_eq!(grid.utilisation(stage), 0.0);
        }

        let mut above = RandomStageSampler::new(7.0, Some(3));
        let grid = StageActivity::generate(20, &mut above);
        assert_eq!(grid.utilisation(Stage::Fetch), 0.0);

        let mut nan = RandomStageSampler::new(f64::NAN, Some(3));
        assert_eq!(nan.stall_probability, STALL_PROBABILITY);
        let grid = StageActivity::generate(20, &mut nan);
        assert_eq!(grid.cycles(), 20);
    }

    #[test]
    fn labels_follow_stage_order() {
        let grid = StageActivity::generate(1, &mut FixedStageSampler(StageState::Active));
        assert_eq!(
            grid.labels(),
            vec![vec!["Fetch", "Decode", "Execute", "Memory", "WriteBack"]]
        );
    }

    #[test]
    fn state_out_of_bounds() {
        let grid = StageActivity::generate(2, &mut FixedStageSampler(StageState::Active));
        assert_eq!(grid.state(1, Stage::Memory), Some(StageState::Active));
        assert_eq!(grid.state(2, Stage::Memory), None);
    }

    #[test]
    fn empty_grid_has_zero_utilisation() {
        let grid = StageActivity::generate(0, &mut FixedStageSampler(StageState::Active));
        assert_eq!(grid.utilisation(Stage::Fetch), 0.0);
    }
}
