//! Distance metrics over the overlapping range of two series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::series::{CapacitySeries, date_grid};

/// How two aligned value vectors are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Mean absolute difference.
    Absolute,
    /// Root mean square difference.
    #[default]
    Euclidean,
    /// One minus cosine similarity; insensitive to scale.
    Cosine,
    /// One minus Pearson correlation; insensitive to scale and offset.
    Correlation,
}

impl DistanceMetric {
    pub const NAMES: &[&str] = &["absolute", "euclidean", "cosine", "correlation"];

    /// Compares two equally long, non-empty vectors. The result is symmetric
    /// in its arguments and zero for identical inputs.
    pub fn compare(self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        if a == b {
            return 0.0;
        }
        let n = a.len() as f64;
        match self {
            Self::Absolute => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / n,
            Self::Euclidean => {
                let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                (sq / n).sqrt()
            }
            Self::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                angular(dot, norm(a), norm(b))
            }
            Self::Correlation => {
                let ca = centered(a);
                let cb = centered(b);
                let dot: f64 = ca.iter().zip(&cb).map(|(x, y)| x * y).sum();
                angular(dot, norm(&ca), norm(&cb))
            }
        }
    }
}

/// `1 - dot / (na * nb)` clamped to `[0, 2]`. Two zero vectors are treated
/// as identical, one zero vector as orthogonal.
fn angular(dot: f64, na: f64, nb: f64) -> f64 {
    match (na == 0.0, nb == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => (1.0 - dot / (na * nb)).clamp(0.0, 2.0),
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn centered(v: &[f64]) -> Vec<f64> {
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    v.iter().map(|x| x - mean).collect()
}

/// First and last date shared by both series, if any.
pub fn overlap(a: &CapacitySeries, b: &CapacitySeries) -> Option<(NaiveDate, NaiveDate)> {
    let start = a.first()?.date.max(b.first()?.date);
    let end = a.last()?.date.min(b.last()?.date);
    (start <= end).then_some((start, end))
}

/// Samples both series on a common grid covering their overlap, both ends
/// included. `None` when the series do not overlap or the step is zero.
pub fn aligned_values(
    a: &CapacitySeries,
    b: &CapacitySeries,
    step_days: u32,
) -> Option<(Vec<f64>, Vec<f64>)> {
    if step_days == 0 {
        return None;
    }
    let (start, end) = overlap(a, b)?;
    let mut grid = date_grid(start, end, step_days);
    if grid.last() != Some(&end) {
        grid.push(end);
    }
    let va = grid.iter().map(|d| a.value_at(*d)).collect::<Option<Vec<_>>>()?;
    let vb = grid.iter().map(|d| b.value_at(*d)).collect::<Option<Vec<_>>>()?;
    Some((va, vb))
}

/// Distance between two series over their overlap, or `None` when they
/// share no dates.
pub fn distance(
    a: &CapacitySeries,
    b: &CapacitySeries,
    metric: DistanceMetric,
    step_days: u32,
) -> Option<f64> {
    let (va, vb) = aligned_values(a, b, step_days)?;
    Some(metric.compare(&va, &vb))
}
