use chrono::{DateTime, Local};

// Metric values are ratios around 1.0
pub fn format_metric(value: f64) -> String {
    format!("{:.3}", value)
}

pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_metric).unwrap_or_else(|| "-".to_string())
}

pub fn format_percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

pub fn format_clock(at: Option<DateTime<Local>>) -> String {
    match at {
        Some(at) => at.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}
