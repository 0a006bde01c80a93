//! Cumulative-capacity time series and the numeric operations on them.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use thiserror::Error;

/// Acceleration-peak detection on smoothed series.
pub mod peaks;
/// Regular-grid resampling and Gaussian smoothing.
pub mod smoothing;

pub use peaks::{AccelerationPeaks, Peak, find_acceleration_peaks};

/// Errors raised when building or transforming a series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("dates must be strictly increasing (point {index} on {date})")]
    NotIncreasing { index: usize, date: NaiveDate },
    #[error("capacity at point {index} is not finite")]
    NonFinite { index: usize },
    #[error("series is empty")]
    Empty,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("grid of {grid} points is too short for a kernel radius of {radius}")]
    GridTooShort { grid: usize, radius: usize },
}

/// One observation of a capacity series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub capacity: f64,
}

/// Capacity over time with strictly increasing dates.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use es_explorer::series::CapacitySeries;
///
/// let d = |m| NaiveDate::from_ymd_opt(2020, m, 1).unwrap();
/// let series = CapacitySeries::cumulative([(d(3), 2.0), (d(1), 5.0), (d(3), 1.0)]);
/// assert_eq!(series.values(), vec![5.0, 8.0]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapacitySeries {
    points: Vec<SeriesPoint>,
}

impl CapacitySeries {
    /// Builds a series from points that are already in date order.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::NotIncreasing`] if two dates are equal or out of
    /// order, and [`SeriesError::NonFinite`] for NaN or infinite values.
    pub fn new(points: Vec<SeriesPoint>) -> Result<Self, SeriesError> {
        for (index, point) in points.iter().enumerate() {
            if !point.capacity.is_finite() {
                return Err(SeriesError::NonFinite { index });
            }
            if index > 0 && points[index - 1].date >= point.date {
                return Err(SeriesError::NotIncreasing {
                    index,
                    date: point.date,
                });
            }
        }
        Ok(Self { points })
    }

    /// Convenience wrapper around [`CapacitySeries::new`] for `(date, value)` pairs.
    ///
    /// # Errors
    ///
    /// Same as [`CapacitySeries::new`].
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Result<Self, SeriesError> {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, capacity)| SeriesPoint { date, capacity })
                .collect(),
        )
    }

    /// Running total of capacity additions.
    ///
    /// Additions are stably sorted by date, additions sharing a date are
    /// merged into one point, and each point holds the total up to and
    /// including its date. Non-negative additions give a non-decreasing
    /// series.
    pub fn cumulative(additions: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut additions: Vec<(NaiveDate, f64)> = additions
            .into_iter()
            .filter(|(_, kw)| kw.is_finite())
            .collect();
        additions.sort_by_key(|(date, _)| *date);

        let mut points: Vec<SeriesPoint> = Vec::with_capacity(additions.len());
        let mut total = 0.0;
        for (date, kw) in additions {
            total += kw;
            match points.last_mut() {
                Some(last) if last.date == date => last.capacity = total,
                _ => points.push(SeriesPoint {
                    date,
                    capacity: total,
                }),
            }
        }
        Self { points }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.capacity).collect()
    }

    /// Whether `date` lies within the series' first and last dates.
    pub fn covers(&self, date: NaiveDate) -> bool {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => first.date <= date && date <= last.date,
            _ => false,
        }
    }

    /// Linearly interpolated value at `date`, or `None` outside the series.
    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        if !self.covers(date) {
            return None;
        }
        Some(self.interpolate(date))
    }

    /// Linearly interpolated value, holding the end values constant outside
    /// the series range. `None` only for an empty series.
    pub fn value_at_clamped(&self, date: NaiveDate) -> Option<f64> {
        let first = self.first()?;
        let last = self.last()?;
        if date <= first.date {
            return Some(first.capacity);
        }
        if date >= last.date {
            return Some(last.capacity);
        }
        Some(self.interpolate(date))
    }

    /// Interpolation for a date known to lie inside the range.
    fn interpolate(&self, date: NaiveDate) -> f64 {
        match self.points.binary_search_by_key(&date, |p| p.date) {
            Ok(i) => self.points[i].capacity,
            Err(i) => {
                let lo = &self.points[i - 1];
                let hi = &self.points[i];
                let span = (hi.date - lo.date).num_days() as f64;
                let offset = (date - lo.date).num_days() as f64;
                lo.capacity + (hi.capacity - lo.capacity) * offset / span
            }
        }
    }

    /// Multiplies every value by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| SeriesPoint {
                    date: p.date,
                    capacity: p.capacity * factor,
                })
                .collect(),
        }
    }

    /// Divides by the maximum value so the peak becomes 1. Series whose
    /// maximum is not positive are returned unchanged.
    pub fn normalized(&self) -> Self {
        let max = self
            .points
            .iter()
            .map(|p| p.capacity)
            .fold(f64::NEG_INFINITY, f64::max);
        if max > 0.0 { self.scaled(1.0 / max) } else { self.clone() }
    }

    /// Second difference of capacity, padded with the edge values so the
    /// result has the same length as the series. Shorter than three points
    /// gives zeros.
    pub fn acceleration(&self) -> Vec<f64> {
        let n = self.points.len();
        if n < 3 {
            return vec![0.0; n];
        }
        let c = self.values();
        let inner: Vec<f64> = c.windows(3).map(|w| w[2] - 2.0 * w[1] + w[0]).collect();
        let mut out = Vec::with_capacity(n);
        out.push(inner[0]);
        out.extend_from_slice(&inner);
        out.push(inner[inner.len() - 1]);
        out
    }
}

/// Dates `start, start + step, ...` strictly before `end`.
pub fn date_grid(start: NaiveDate, end: NaiveDate, step_days: u32) -> Vec<NaiveDate> {
    let mut grid = Vec::new();
    if step_days == 0 {
        return grid;
    }
    let mut date = start;
    while date < end {
        grid.push(date);
        match date.checked_add_days(Days::new(u64::from(step_days))) {
            Some(next) => date = next,
            None => break,
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn new_rejects_duplicate_dates() {
        let err = CapacitySeries::from_pairs([(d(2020, 1, 1), 1.0), (d(2020, 1, 1), 2.0)]);
        assert!(matches!(err, Err(SeriesError::NotIncreasing { index: 1, .. })));
    }

    #[test]
    fn new_rejects_nan() {
        let err = CapacitySeries::from_pairs([(d(2020, 1, 1), f64::NAN)]);
        assert_eq!(err, Err(SeriesError::NonFinite { index: 0 }));
    }

    #[test]
    fn cumulative_is_non_decreasing() {
        let s = CapacitySeries::cumulative([
            (d(2021, 1, 1), 4.0),
            (d(2020, 1, 1), 1.0),
            (d(2020, 6, 1), 0.0),
            (d(2020, 6, 1), 2.5),
        ]);
        assert_eq!(s.values(), vec![1.0, 3.5, 7.5]);
        assert!(s.values().windows(2).all(|w| w[0] <= w[1]));
        assert!(CapacitySeries::new(s.points().to_vec()).is_ok());
    }

    #[test]
    fn interpolates_between_points() {
        let s = CapacitySeries::from_pairs([(d(2020, 1, 1), 0.0), (d(2020, 1, 11), 10.0)])
            .expect("increasing dates");
        assert_eq!(s.value_at(d(2020, 1, 6)), Some(5.0));
        assert_eq!(s.value_at(d(2020, 1, 11)), Some(10.0));
        assert_eq!(s.value_at(d(2020, 1, 12)), None);
        assert_eq!(s.value_at_clamped(d(2020, 1, 12)), Some(10.0));
        assert_eq!(s.value_at_clamped(d(2019, 1, 1)), Some(0.0));
    }

    #[test]
    fn normalized_peak_is_one() {
        let s = CapacitySeries::from_pairs([(d(2020, 1, 1), 2.0), (d(2020, 2, 1), 8.0)])
            .expect("increasing dates");
        assert_eq!(s.normalized().values(), vec![0.25, 1.0]);
    }

    #[test]
    fn acceleration_is_edge_padded() {
        let s = CapacitySeries::from_pairs([
            (d(2020, 1, 1), 0.0),
            (d(2020, 1, 2), 1.0),
            (d(2020, 1, 3), 4.0),
            (d(2020, 1, 4), 9.0),
        ])
        .expect("increasing dates");
        assert_eq!(s.acceleration(), vec![2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn date_grid_excludes_end() {
        let grid = date_grid(d(2020, 1, 1), d(2020, 1, 8), 3);
        assert_eq!(grid, vec![d(2020, 1, 1), d(2020, 1, 4), d(2020, 1, 7)]);
        assert!(date_grid(d(2020, 1, 1), d(2020, 1, 8), 0).is_empty());
    }
}
