// Valuation engine: statistical primitives, player composites, lineup
// optimization and roster-level reports.

pub mod best_ball;
pub mod injury;
pub mod linear;
pub mod position;
pub mod power;
pub mod pwrb;
pub mod stats;
pub mod wopr;

use serde::Serialize;

/// Round `value` to `decimals` places for display tables.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Ordered score thresholds mapped to tier labels.
///
/// Thresholds are checked from highest to lowest; a score at or above a
/// threshold gets that label. Anything below every threshold gets `floor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierScale {
    thresholds: Vec<(f64, String)>,
    floor: String,
}

impl TierScale {
    pub fn new<I, S>(thresholds: I, floor: &str) -> Self
    where
        I: IntoIterator<Item = (f64, S)>,
        S: Into<String>,
    {
        let mut thresholds: Vec<(f64, String)> = thresholds
            .into_iter()
            .map(|(t, label)| (t, label.into()))
            .collect();
        thresholds.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            thresholds,
            floor: floor.to_string(),
        }
    }

    pub fn label(&self, score: f64) -> &str {
        self.thresholds
            .iter()
            .find(|(t, _)| score >= *t)
            .map(|(_, label)| label.as_str())
            .unwrap_or(&self.floor)
    }
}
