// Numeric primitives shared by the projection models.
//
// Everything here is a pure function of its arguments: no clocks, no global
// state, and degenerate inputs map to a defined fallback instead of NaN.

use std::cmp::Ordering;

/// Default smoothing factor for [`ewma`].
pub const DEFAULT_EWMA_ALPHA: f64 = 0.3;

/// Default pull toward the baseline for [`regression_to_mean`].
pub const DEFAULT_REGRESSION_FACTOR: f64 = 0.12;

/// Default decay rate for [`time_weight`].
pub const DEFAULT_DECAY_RATE: f64 = 0.1;

/// Ordinary-least-squares slope of `values` against their index.
///
/// Returns 0.0 for fewer than three points or when the index variance is
/// degenerate.
pub fn trend(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    if sxx.abs() < f64::EPSILON {
        return 0.0;
    }
    sxy / sxx
}

/// Exponentially weighted moving average seeded with the first value.
///
/// Empty input yields 0.0; a single value is returned as-is.
pub fn ewma(values: &[f64], alpha: f64) -> f64 {
    let Some((&first, rest)) = values.split_first() else {
        return 0.0;
    };
    rest.iter()
        .fold(first, |acc, &v| alpha * v + (1.0 - alpha) * acc)
}

/// Shrink `value` toward `baseline` by `factor`.
pub fn regression_to_mean(value: f64, baseline: f64, factor: f64) -> f64 {
    value + factor * (baseline - value)
}

/// Step-function confidence in a sample of `n` observations.
pub fn sample_size_confidence(n: usize) -> f64 {
    match n {
        8.. => 1.0,
        5..=7 => 0.9,
        3..=4 => 0.75,
        1..=2 => 0.5,
        0 => 0.25,
    }
}

/// Exponential decay weight for an observation `weeks_ago` weeks old.
pub fn time_weight(weeks_ago: f64, decay_rate: f64) -> f64 {
    (-decay_rate * weeks_ago).exp()
}

/// Population variance. Fewer than two values yields 0.0.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Nearest-rank quantile of an already sorted slice.
///
/// Uses index `round(q * (n - 1))`, clamped into range. Empty input yields 0.0.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let last = sorted.len() - 1;
    let idx = (q * last as f64).round();
    let idx = if idx.is_nan() || idx < 0.0 {
        0
    } else {
        (idx as usize).min(last)
    };
    sorted[idx]
}

fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------
// Empirical CDF
// ---------------------------------------------------------------------------

/// Quantile-rank lookup over a training sample.
#[derive(Debug, Clone)]
pub struct EmpiricalCdf {
    sorted: Vec<f64>,
}

impl EmpiricalCdf {
    /// Build the lookup from an unordered training sample. Non-finite values
    /// are discarded.
    pub fn new(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(cmp_f64);
        Self { sorted }
    }

    /// Rank of `x` within the training sample, in `[0, 1]`.
    ///
    /// Queries are clamped to the training range first, so anything at or
    /// below the minimum ranks 0 and anything at or above the maximum ranks 1.
    /// An empty or single-valued sample ranks everything at 0.5.
    pub fn rank(&self, x: f64) -> f64 {
        let n = self.sorted.len();
        if n < 2 {
            return 0.5;
        }
        let lo = self.sorted[0];
        let hi = self.sorted[n - 1];
        if hi - lo < f64::EPSILON {
            return 0.5;
        }
        let x = if x.is_nan() { lo } else { x.clamp(lo, hi) };
        // Number of training values <= x; at least one after clamping.
        let count = self.sorted.partition_point(|v| *v <= x);
        ((count.saturating_sub(1)) as f64 / (n - 1) as f64).clamp(0.0, 1.0)
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}
