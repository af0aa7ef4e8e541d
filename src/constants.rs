pub const TICK_RATE_MS: u64 = 1000;
pub const MAX_SERIES_LEN: usize = 20;

// Default metric ranges: (name, min, max)
pub const DEFAULT_RANGES: [(&str, f64, f64); 2] = [("CPI", 0.8, 2.0), ("IPC", 0.5, 1.5)];

pub const STAGE_CYCLES: usize = 20;
pub const STALL_PROBABILITY: f64 = 0.2;

// UI redraw cadence, independent of the tick interval
pub const REDRAW_RATE_MS: u64 = 100;
