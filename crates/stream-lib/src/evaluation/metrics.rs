//! Metrics over `(target, output)` pairs

use crate::types::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Mean absolute error
    Mae,
    /// Mean squared error
    Mse,
    /// Root mean squared error
    Rmse,
    /// Mean absolute percentage error, zero targets skipped
    Mape,
    /// Share of rows whose arg-max (or rounded value) matches
    Accuracy,
}

impl Metric {
    /// Metric value, `None` when there is nothing to score
    pub fn compute(&self, targets: &[Sample], outputs: &[Sample]) -> Option<f64> {
        let pairs = targets.iter().zip(outputs);

        match self {
            Metric::Mae => mean(pairs.flat_map(elementwise).map(|(t, o)| (t - o).abs())),
            Metric::Mse => mean(pairs.flat_map(elementwise).map(|(t, o)| (t - o).powi(2))),
            Metric::Rmse => Metric::Mse.compute(targets, outputs).map(f64::sqrt),
            Metric::Mape => mean(
                pairs
                    .flat_map(elementwise)
                    .filter(|(t, _)| *t != 0.0)
                    .map(|(t, o)| ((t - o) / t).abs() * 100.0),
            ),
            Metric::Accuracy => mean(pairs.map(|(t, o)| {
                if class_of(t) == class_of(o) {
                    1.0
                } else {
                    0.0
                }
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Mae => "mae",
            Metric::Mse => "mse",
            Metric::Rmse => "rmse",
            Metric::Mape => "mape",
            Metric::Accuracy => "accuracy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mae" => Ok(Metric::Mae),
            "mse" => Ok(Metric::Mse),
            "rmse" => Ok(Metric::Rmse),
            "mape" => Ok(Metric::Mape),
            "accuracy" | "acc" => Ok(Metric::Accuracy),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

fn elementwise<'a>((t, o): (&'a Sample, &'a Sample)) -> impl Iterator<Item = (f64, f64)> + 'a {
    t.iter().zip(o).map(|(&t, &o)| (t as f64, o as f64))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Arg-max for one-hot rows, rounded value for scalars
pub(super) fn class_of(row: &[f32]) -> i64 {
    if row.len() == 1 {
        return row[0].round() as i64;
    }
    row.iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0 as i64
}
