use chrono::NaiveDate;

use super::{CapacitySeries, SeriesError, SeriesPoint, date_grid};

impl CapacitySeries {
    /// Samples the series on `start, start + step, ...` before `end`, holding
    /// the end values constant outside the series range.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] for an empty series and
    /// [`SeriesError::InvalidParameter`] for a zero step.
    pub fn resample(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        step_days: u32,
    ) -> Result<Self, SeriesError> {
        if step_days == 0 {
            return Err(SeriesError::InvalidParameter("step_days must be > 0".into()));
        }
        let points = date_grid(start, end, step_days)
            .into_iter()
            .map(|date| {
                self.value_at_clamped(date)
                    .map(|capacity| SeriesPoint { date, capacity })
                    .ok_or(SeriesError::Empty)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { points })
    }

    /// Resamples onto a regular grid and applies a Gaussian kernel.
    ///
    /// The kernel spans three standard deviations either side. Grid points
    /// closer than that to either end are trimmed, so every remaining value
    /// is a full-kernel average. Negative results are clamped to zero.
    ///
    /// # Errors
    ///
    /// Fails for an empty series, zero `delta_days` or `sigma_days`, or when
    /// the grid is not longer than twice the kernel radius.
    pub fn smooth(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        delta_days: u32,
        sigma_days: u32,
    ) -> Result<Self, SeriesError> {
        if sigma_days == 0 {
            return Err(SeriesError::InvalidParameter("sigma_days must be > 0".into()));
        }
        let grid = self.resample(start, end, delta_days)?;
        let delta = f64::from(delta_days);
        let sigma = f64::from(sigma_days);
        let radius = (3.0 * sigma / delta) as usize;
        let kernel = gaussian_kernel(radius, delta, sigma);

        let n = grid.len();
        if n <= 2 * radius {
            return Err(SeriesError::GridTooShort { grid: n, radius });
        }

        let points = (radius..n - radius)
            .map(|i| {
                let window = &grid.points[i - radius..=i + radius];
                let capacity: f64 = window
                    .iter()
                    .zip(&kernel)
                    .map(|(p, w)| p.capacity * w)
                    .sum();
                SeriesPoint {
                    date: grid.points[i].date,
                    capacity: capacity.max(0.0),
                }
            })
            .collect();
        Ok(Self { points })
    }
}

/// Normalized Gaussian weights for offsets `-radius..=radius` grid steps.
fn gaussian_kernel(radius: usize, delta: f64, sigma: f64) -> Vec<f64> {
    let r = radius as i64;
    let mut kernel: Vec<f64> = (-r..=r)
        .map(|j| {
            let x = j as f64 * delta / sigma;
            (-0.5 * x * x).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}
