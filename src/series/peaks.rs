use chrono::NaiveDate;
use serde::Serialize;

use super::{CapacitySeries, SeriesError};

/// A detected acceleration extremum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub date: NaiveDate,
    /// Percentile value of the acceleration window around the extremum.
    pub value: f64,
}

/// Isolated acceleration extrema of a smoothed series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccelerationPeaks {
    pub maxima: Vec<Peak>,
    pub minima: Vec<Peak>,
}

impl AccelerationPeaks {
    /// Highest maximum; the earliest wins ties.
    pub fn max(&self) -> Option<Peak> {
        self.maxima
            .iter()
            .copied()
            .reduce(|best, p| if p.value > best.value { p } else { best })
    }

    /// Lowest minimum; the earliest wins ties.
    pub fn min(&self) -> Option<Peak> {
        self.minima
            .iter()
            .copied()
            .reduce(|best, p| if p.value < best.value { p } else { best })
    }

    /// Mean rate of maxima per year, from the average spacing of consecutive
    /// maxima. Zero with fewer than two maxima.
    pub fn frequency_per_year(&self) -> f64 {
        if self.maxima.len() < 2 {
            return 0.0;
        }
        let gaps: Vec<f64> = self
            .maxima
            .windows(2)
            .map(|w| (w[1].date - w[0].date).num_days() as f64)
            .collect();
        let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
        if mean > 0.0 { 365.25 / mean } else { 0.0 }
    }
}

/// Finds isolated peaks in the acceleration of a smoothed, regularly spaced
/// series.
///
/// A point is a maximum (minimum) when it is strictly greater (smaller) than
/// every other point within `3 * sigma` of it. Each peak is reported with the
/// 95th (5th) percentile of that window rather than its raw value, which
/// damps single-sample spikes.
///
/// # Errors
///
/// Returns [`SeriesError::InvalidParameter`] if the series has fewer than two
/// points or `sigma_days` is zero.
pub fn find_acceleration_peaks(
    series: &CapacitySeries,
    sigma_days: u32,
) -> Result<AccelerationPeaks, SeriesError> {
    let points = series.points();
    if points.len() < 2 {
        return Err(SeriesError::InvalidParameter(
            "peak detection needs at least two points".into(),
        ));
    }
    if sigma_days == 0 {
        return Err(SeriesError::InvalidParameter("sigma_days must be > 0".into()));
    }

    let interval = (points[1].date - points[0].date).num_days().max(1) as f64;
    let width = ((3.0 * f64::from(sigma_days) / interval) as usize).max(1);
    let accel = series.acceleration();

    let mut peaks = AccelerationPeaks::default();
    for i in extrema(&accel, width, |a, b| a > b) {
        peaks.maxima.push(Peak {
            date: points[i].date,
            value: percentile(window(&accel, i, width), 95.0),
        });
    }
    for i in extrema(&accel, width, |a, b| a < b) {
        peaks.minima.push(Peak {
            date: points[i].date,
            value: percentile(window(&accel, i, width), 5.0),
        });
    }
    Ok(peaks)
}

/// Interior indices whose value beats every neighbour within `order` steps.
fn extrema(values: &[f64], order: usize, beats: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let n = values.len();
    (1..n.saturating_sub(1))
        .filter(|&i| {
            let lo = i.saturating_sub(order);
            let hi = (i + order).min(n - 1);
            (lo..=hi)
                .filter(|&j| j != i)
                .all(|j| beats(values[i], values[j]))
        })
        .collect()
}

fn window(values: &[f64], center: usize, width: usize) -> &[f64] {
    let start = center.saturating_sub(width);
    let end = (center + width).min(values.len());
    &values[start..end]
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(values: &[f64], pct: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = pct / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}
