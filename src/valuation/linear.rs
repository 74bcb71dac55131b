// Linear model relating a week's PWOPR to the following week's fantasy points.
//
// One global fit plus optional per-position fits. Each upcoming player gets a
// predicted score from whichever fit is trusted for their position, and the
// gap between that prediction and the external projection becomes a signal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::valuation::position::Position;

/// Minimum number of paired observations for any fit.
pub const MIN_FIT_SAMPLES: usize = 8;

/// Positions that get their own model when enough history exists.
const MODELED_POSITIONS: [Position; 4] = [Position::QB, Position::RB, Position::WR, Position::TE];

// ---------------------------------------------------------------------------
// Ordinary least squares
// ---------------------------------------------------------------------------

/// Result of a simple linear regression `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    /// Coefficient of determination, clamped to `[0, 1]`.
    pub r2: f64,
    pub n: usize,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Closed-form OLS over paired samples.
///
/// Returns `None` for fewer than [`MIN_FIT_SAMPLES`] pairs, mismatched
/// lengths, or when every `x` is the same value.
pub fn fit_linear(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    if xs.len() != ys.len() || xs.len() < MIN_FIT_SAMPLES {
        return None;
    }
    let n = xs.len() as f64;
    let (mut sx, mut sy, mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
        syy += y * y;
    }

    let denom = n * sxx - sx * sx;
    // Relative check so that a column of identical non-integer xs still
    // registers as degenerate after rounding.
    if denom.abs() <= 1e-9 * (n * sxx).abs().max(1.0) {
        return None;
    }
    let slope = (n * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / n;

    let ss_tot = syy - sy * sy / n;
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r2 = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(LinearFit {
        intercept,
        slope,
        r2,
        n: xs.len(),
    })
}

// ---------------------------------------------------------------------------
// Options and signals
// ---------------------------------------------------------------------------

/// Tunables for model selection, clamping and signal bucketing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearModelOptions {
    pub min_by_pos_samples: usize,
    /// How much worse than the global R² a position fit may be and still win.
    pub r2_tolerance: f64,
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub strong_threshold: f64,
    pub weak_threshold: f64,
}

impl Default for LinearModelOptions {
    fn default() -> Self {
        Self {
            min_by_pos_samples: 12,
            r2_tolerance: 0.03,
            clamp_min: -5.0,
            clamp_max: 45.0,
            strong_threshold: 4.0,
            weak_threshold: 1.5,
        }
    }
}

/// Direction and strength of the model's disagreement with the external
/// projection, from most bullish to most bearish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Signal {
    OverStrong,
    Over,
    Neutral,
    Under,
    UnderStrong,
}

impl Signal {
    pub fn label(&self) -> &'static str {
        match self {
            Signal::OverStrong => "Over Strong",
            Signal::Over => "Over",
            Signal::Neutral => "Neutral",
            Signal::Under => "Under",
            Signal::UnderStrong => "Under Strong",
        }
    }

    /// Bucket `predicted - external`. Either side being exactly zero means
    /// data was missing and always yields `Neutral`.
    pub fn classify(predicted: f64, external: f64, options: &LinearModelOptions) -> Signal {
        if predicted == 0.0 || external == 0.0 {
            return Signal::Neutral;
        }
        let delta = predicted - external;
        if delta >= options.strong_threshold {
            Signal::OverStrong
        } else if delta >= options.weak_threshold {
            Signal::Over
        } else if delta <= -options.strong_threshold {
            Signal::UnderStrong
        } else if delta <= -options.weak_threshold {
            Signal::Under
        } else {
            Signal::Neutral
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// One training observation: a week's PWOPR and the next week's points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryRow {
    pub position: Option<Position>,
    pub pwopr: f64,
    pub actual_points: f64,
}

/// One player to score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpcomingRow {
    pub position: Option<Position>,
    pub pwopr: f64,
    pub external_projection: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearScore {
    pub predicted: f64,
    pub delta: f64,
    pub signal: Signal,
    /// Position the winning fit was trained on, `None` for the global fit.
    pub model_position: Option<Position>,
}

/// Trained global and per-position fits.
#[derive(Debug, Clone)]
pub struct PwoprLinearModel {
    global: Option<LinearFit>,
    by_position: HashMap<Position, LinearFit>,
    options: LinearModelOptions,
}

impl PwoprLinearModel {
    pub fn train(history: &[HistoryRow], options: LinearModelOptions) -> Self {
        let xs: Vec<f64> = history.iter().map(|r| r.pwopr).collect();
        let ys: Vec<f64> = history.iter().map(|r| r.actual_points).collect();
        let global = fit_linear(&xs, &ys);

        let mut by_position = HashMap::new();
        for pos in MODELED_POSITIONS {
            let (pxs, pys): (Vec<f64>, Vec<f64>) = history
                .iter()
                .filter(|r| r.position == Some(pos))
                .map(|r| (r.pwopr, r.actual_points))
                .unzip();
            if pxs.len() < options.min_by_pos_samples {
                continue;
            }
            if let Some(fit) = fit_linear(&pxs, &pys) {
                by_position.insert(pos, fit);
            }
        }

        Self {
            global,
            by_position,
            options,
        }
    }

    pub fn global(&self) -> Option<&LinearFit> {
        self.global.as_ref()
    }

    pub fn position_fit(&self, pos: Position) -> Option<&LinearFit> {
        self.by_position.get(&pos)
    }

    /// The fit to use for `position`: the position fit when its R² is within
    /// tolerance of the global fit, else the global fit.
    fn select(&self, position: Option<Position>) -> Option<(&LinearFit, Option<Position>)> {
        let pos_fit = position.and_then(|p| self.by_position.get(&p).map(|f| (f, p)));
        match (pos_fit, self.global.as_ref()) {
            (Some((pf, p)), Some(g)) if pf.r2 >= g.r2 - self.options.r2_tolerance => Some((pf, Some(p))),
            (Some((pf, p)), None) => Some((pf, Some(p))),
            (_, Some(g)) => Some((g, None)),
            (None, None) => None,
        }
    }

    /// Score one upcoming row. `None` when no fit could be trained.
    pub fn score(&self, row: &UpcomingRow) -> Option<LinearScore> {
        let (fit, model_position) = self.select(row.position)?;
        let predicted = fit
            .predict(row.pwopr)
            .clamp(self.options.clamp_min, self.options.clamp_max);
        Some(LinearScore {
            predicted,
            delta: predicted - row.external_projection,
            signal: Signal::classify(predicted, row.external_projection, &self.options),
            model_position,
        })
    }
}

/// Train on `history` and score every row of `upcoming`, preserving order.
pub fn score_with_pwopr(
    history: &[HistoryRow],
    upcoming: &[UpcomingRow],
    options: &LinearModelOptions,
) -> Vec<Option<LinearScore>> {
    let model = PwoprLinearModel::train(history, options.clone());
    upcoming.iter().map(|row| model.score(row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(position: Position, pwopr: f64, actual: f64) -> HistoryRow {
        HistoryRow {
            position: Some(position),
            pwopr,
            actual_points: actual,
        }
    }

    #[test]
    fn fit_needs_eight_samples() {
        let xs: Vec<f64> = (0..7).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x + 1.0).collect();
        assert!(fit_linear(&xs, &ys).is_none());
    }

    #[test]
    fn fit_rejects_constant_x() {
        let xs = vec![0.3; 10];
        let ys: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(fit_linear(&xs, &ys).is_none());
        assert!(fit_linear(&[4.0; 9], &[1.0; 9]).is_none());
    }

    #[test]
    fn fit_recovers_exact_line() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 20.0 * x + 3.0).collect();
        let fit = fit_linear(&xs, &ys).unwrap();
        assert!((fit.slope - 20.0).abs() < 1e-9);
        assert!((fit.intercept - 3.0).abs() < 1e-9);
        assert!((fit.r2 - 1.0).abs() < 1e-9);
        assert_eq!(fit.n, 10);
    }

    #[test]
    fn r2_stays_in_unit_interval() {
        let xs: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let ys = vec![5.0, -3.0, 8.0, 1.0, 0.0, 9.0, -4.0, 2.0];
        let fit = fit_linear(&xs, &ys).unwrap();
        assert!((0.0..=1.0).contains(&fit.r2));
    }

    #[test]
    fn zero_external_projection_is_neutral() {
        let opts = LinearModelOptions::default();
        for predicted in [-5.0, 0.5, 12.0, 45.0] {
            assert_eq!(Signal::classify(predicted, 0.0, &opts), Signal::Neutral);
        }
        assert_eq!(Signal::classify(0.0, 20.0, &opts), Signal::Neutral);
    }

    #[test]
    fn signal_buckets() {
        let opts = LinearModelOptions::default();
        assert_eq!(Signal::classify(15.0, 10.0, &opts), Signal::OverStrong);
        assert_eq!(Signal::classify(12.0, 10.0, &opts), Signal::Over);
        assert_eq!(Signal::classify(10.5, 10.0, &opts), Signal::Neutral);
        assert_eq!(Signal::classify(8.0, 10.0, &opts), Signal::Under);
        assert_eq!(Signal::classify(5.0, 10.0, &opts), Signal::UnderStrong);
        assert_eq!(Signal::UnderStrong.label(), "Under Strong");
    }

    #[test]
    fn prediction_is_clamped() {
        let history: Vec<HistoryRow> = (0..10)
            .map(|i| hist(Position::WR, i as f64 * 0.1, 100.0 * i as f64 * 0.1))
            .collect();
        let model = PwoprLinearModel::train(&history, LinearModelOptions::default());
        let score = model
            .score(&UpcomingRow {
                position: Some(Position::WR),
                pwopr: 5.0,
                external_projection: 10.0,
            })
            .unwrap();
        assert_eq!(score.predicted, 45.0);
        assert_eq!(score.signal, Signal::OverStrong);
    }

    #[test]
    fn position_model_requires_min_samples() {
        // 10 WR rows: enough for a global fit, not for a WR fit.
        let history: Vec<HistoryRow> = (0..10)
            .map(|i| hist(Position::WR, i as f64 * 0.1, 10.0 * i as f64 * 0.1))
            .collect();
        let model = PwoprLinearModel::train(&history, LinearModelOptions::default());
        assert!(model.global().is_some());
        assert!(model.position_fit(Position::WR).is_none());
        let score = model
            .score(&UpcomingRow {
                position: Some(Position::WR),
                pwopr: 0.5,
                external_projection: 5.0,
            })
            .unwrap();
        assert_eq!(score.model_position, None);
    }

    #[test]
    fn position_model_preferred_when_not_worse() {
        // TE rows fit a perfect line; RB rows are noise that drags the
        // global R² down.
        let mut history: Vec<HistoryRow> = (0..12)
            .map(|i| hist(Position::TE, i as f64 * 0.05, 30.0 * i as f64 * 0.05 + 2.0))
            .collect();
        let noise = [9.0, 1.0, 7.0, 0.0, 12.0, 3.0, 8.0, 2.0, 11.0, 4.0, 6.0, 5.0];
        history.extend(
            noise
                .iter()
                .enumerate()
                .map(|(i, &y)| hist(Position::RB, i as f64 * 0.05, y)),
        );
        let model = PwoprLinearModel::train(&history, LinearModelOptions::default());
        let te = model.position_fit(Position::TE).unwrap();
        assert!(te.r2 > model.global().unwrap().r2);

        let score = model
            .score(&UpcomingRow {
                position: Some(Position::TE),
                pwopr: 0.2,
                external_projection: 8.0,
            })
            .unwrap();
        assert_eq!(score.model_position, Some(Position::TE));
        assert!((score.predicted - 8.0).abs() < 1e-9);
        assert_eq!(score.signal, Signal::Neutral);
    }

    #[test]
    fn worse_position_model_falls_back_to_global() {
        let mut history: Vec<HistoryRow> = (0..12)
            .map(|i| hist(Position::WR, i as f64 * 0.05, 20.0 * i as f64 * 0.05))
            .collect();
        let noise = [9.0, 1.0, 7.0, 0.0, 12.0, 3.0, 8.0, 2.0, 11.0, 4.0, 6.0, 5.0];
        history.extend(
            noise
                .iter()
                .enumerate()
                .map(|(i, &y)| hist(Position::RB, i as f64 * 0.05, y)),
        );
        let model = PwoprLinearModel::train(&history, LinearModelOptions::default());
        let rb = model.position_fit(Position::RB).unwrap();
        assert!(rb.r2 < model.global().unwrap().r2 - 0.03);
        let score = model
            .score(&UpcomingRow {
                position: Some(Position::RB),
                pwopr: 0.2,
                external_projection: 8.0,
            })
            .unwrap();
        assert_eq!(score.model_position, None);
    }

    #[test]
    fn no_history_yields_no_scores() {
        let out = score_with_pwopr(
            &[],
            &[UpcomingRow {
                position: Some(Position::WR),
                pwopr: 0.4,
                external_projection: 10.0,
            }],
            &LinearModelOptions::default(),
        );
        assert_eq!(out, vec![None]);
    }
}
