//! Nearest-neighbour ranking and trend projection over capacity series.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use super::metric::{DistanceMetric, distance};
use super::SimilarityError;
use crate::series::{CapacitySeries, SeriesPoint};

/// Parameters for ranking and projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityConfig {
    pub metric: DistanceMetric,
    /// Number of neighbours kept.
    pub k: usize,
    /// How far past the query's last date to project.
    pub horizon_days: u32,
    /// Spacing of the comparison and projection grids.
    pub step_days: u32,
    /// Never return a candidate carrying the query's key.
    pub exclude_self: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            k: 3,
            horizon_days: 365,
            step_days: 7,
            exclude_self: true,
        }
    }
}

/// A labelled series offered for comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: String,
    pub series: CapacitySeries,
}

/// A ranked neighbour of the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub key: String,
    pub distance: f64,
    /// Share of this neighbour in the projection blend.
    pub weight: f64,
}

/// One projected future value with the spread of neighbour contributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedPoint {
    pub date: NaiveDate,
    pub capacity: f64,
    pub lower: f64,
    pub upper: f64,
    /// Neighbours whose data reach this date.
    pub contributors: usize,
}

/// Ranked neighbours of a query and its projected continuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub query: String,
    pub query_series: CapacitySeries,
    pub neighbors: Vec<Neighbor>,
    /// Future points only; empty when no neighbour extends past the query.
    pub projection: Vec<ProjectedPoint>,
}

impl SimilarityResult {
    pub fn is_projected(&self) -> bool {
        !self.projection.is_empty()
    }

    /// The query's known points followed by the projected ones.
    pub fn projected_series(&self) -> CapacitySeries {
        let points = self
            .query_series
            .points()
            .iter()
            .copied()
            .chain(self.projection.iter().map(|p| SeriesPoint {
                date: p.date,
                capacity: p.capacity,
            }))
            .collect();
        // projection dates start strictly after the query's last date
        CapacitySeries::new(points).unwrap_or_else(|_| self.query_series.clone())
    }
}

impl fmt::Display for SimilarityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Similarity: {} ---", self.query)?;
        for (rank, n) in self.neighbors.iter().enumerate() {
            writeln!(
                f,
                "#{:<2} {:<12} distance={:.4}  weight={:.3}",
                rank + 1,
                n.key,
                n.distance,
                n.weight
            )?;
        }
        match (self.query_series.last(), self.projection.last()) {
            (Some(known), Some(end)) => write!(
                f,
                "Projection: {:.2} on {} -> {:.2} on {} [{:.2}, {:.2}]",
                known.capacity, known.date, end.capacity, end.date, end.lower, end.upper
            ),
            _ => write!(f, "Projection: none (no neighbour extends past the query)"),
        }
    }
}

/// Outcome of projecting a truncated series and comparing with what
/// actually followed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backtest {
    pub result: SimilarityResult,
    /// Mean absolute error over projected dates the actual series covers.
    pub mean_abs_error: Option<f64>,
}

/// Symmetric pairwise distances between all candidates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceMatrix {
    pub keys: Vec<String>,
    /// `None` where two series share no dates.
    pub values: Vec<Vec<Option<f64>>>,
}

impl DistanceMatrix {
    pub fn get(&self, m: usize, n: usize) -> Option<f64> {
        self.values.get(m).and_then(|row| row.get(n)).copied().flatten()
    }

    /// The most similar pair of distinct candidates as `(m, n, distance)`
    /// with `m < n`; earlier pairs win ties.
    pub fn closest_pair(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for m in 0..self.keys.len() {
            for n in m + 1..self.keys.len() {
                if let Some(d) = self.get(m, n) {
                    if best.is_none_or(|(_, _, b)| d < b) {
                        best = Some((m, n, d));
                    }
                }
            }
        }
        best
    }
}

struct Ranked {
    index: usize,
    distance: f64,
}

/// Compares a query series against a fixed candidate pool.
///
/// Deterministic: the same candidates, query and configuration always give
/// the same result.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    config: SimilarityConfig,
    candidates: Vec<Candidate>,
}

impl SimilarityEngine {
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            config,
            candidates: Vec::new(),
        }
    }

    pub fn with_candidates(
        config: SimilarityConfig,
        candidates: impl IntoIterator<Item = Candidate>,
    ) -> Self {
        Self {
            config,
            candidates: candidates.into_iter().collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, series: CapacitySeries) {
        self.candidates.push(Candidate {
            key: key.into(),
            series,
        });
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidate(&self, key: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.key == key)
    }

    /// Distance under the configured metric, `None` without overlap.
    pub fn distance(&self, a: &CapacitySeries, b: &CapacitySeries) -> Option<f64> {
        distance(a, b, self.config.metric, self.config.step_days)
    }

    pub fn distance_matrix(&self) -> DistanceMatrix {
        let n = self.candidates.len();
        let mut values = vec![vec![None; n]; n];
        for m in 0..n {
            for j in 0..=m {
                let d = self.distance(&self.candidates[m].series, &self.candidates[j].series);
                values[m][j] = d;
                values[j][m] = d;
            }
        }
        DistanceMatrix {
            keys: self.candidates.iter().map(|c| c.key.clone()).collect(),
            values,
        }
    }

    /// All eligible candidates by ascending distance; ties keep insertion
    /// order.
    fn rank(&self, key: &str, query: &CapacitySeries) -> Result<Vec<Ranked>, SimilarityError> {
        if self.config.step_days == 0 {
            return Err(SimilarityError::InvalidConfig("step_days must be > 0".into()));
        }
        if query.is_empty() {
            return Err(SimilarityError::EmptyQuery {
                query: key.to_string(),
            });
        }
        let mut ranked: Vec<Ranked> = self
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !(self.config.exclude_self && c.key == key))
            .filter_map(|(index, c)| {
                self.distance(query, &c.series)
                    .map(|distance| Ranked { index, distance })
            })
            .collect();
        if ranked.is_empty() {
            return Err(SimilarityError::NoEligibleCandidates {
                query: key.to_string(),
            });
        }
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(ranked)
    }

    /// The `k` nearest candidates with their blend weights.
    ///
    /// # Errors
    ///
    /// [`SimilarityError::EmptyQuery`] for a query without points and
    /// [`SimilarityError::NoEligibleCandidates`] when no candidate overlaps it.
    pub fn nearest(
        &self,
        key: &str,
        query: &CapacitySeries,
    ) -> Result<Vec<Neighbor>, SimilarityError> {
        let mut ranked = self.rank(key, query)?;
        ranked.truncate(self.config.k);
        Ok(self.to_neighbors(&ranked))
    }

    /// Ranks neighbours and projects the query past its last date.
    ///
    /// Each neighbour contributes its growth since the query's last date,
    /// re-anchored to the query's last value. Contributions are blended by
    /// reciprocal distance among the neighbours whose data reach a given
    /// date, and the projection ends at the first date none reach. When no
    /// neighbour extends past the query the result carries no projection.
    ///
    /// # Errors
    ///
    /// Same as [`SimilarityEngine::nearest`].
    pub fn project(
        &self,
        key: &str,
        query: &CapacitySeries,
    ) -> Result<SimilarityResult, SimilarityError> {
        let mut ranked = self.rank(key, query)?;
        ranked.truncate(self.config.k);
        let neighbors = self.to_neighbors(&ranked);

        let projection = match query.last() {
            Some(anchor) => self.blend(anchor, &ranked),
            None => Vec::new(),
        };
        if projection.is_empty() {
            log::debug!("{key}: no neighbour extends past {:?}", query.last().map(|p| p.date));
        }

        Ok(SimilarityResult {
            query: key.to_string(),
            query_series: query.clone(),
            neighbors,
            projection,
        })
    }

    /// Projects a candidate already in the pool.
    ///
    /// # Errors
    ///
    /// [`SimilarityError::UnknownKey`] if no candidate has `key`, otherwise as
    /// [`SimilarityEngine::project`].
    pub fn project_key(&self, key: &str) -> Result<SimilarityResult, SimilarityError> {
        let candidate = self
            .candidate(key)
            .ok_or_else(|| SimilarityError::UnknownKey(key.to_string()))?;
        self.project(key, &candidate.series)
    }

    /// Cuts a candidate's series in half, projects the first half from the
    /// other candidates, and scores the projection against the second half.
    ///
    /// # Errors
    ///
    /// As [`SimilarityEngine::project_key`]; a series with fewer than two
    /// points yields [`SimilarityError::EmptyQuery`].
    pub fn backtest(&self, key: &str) -> Result<Backtest, SimilarityError> {
        let candidate = self
            .candidate(key)
            .ok_or_else(|| SimilarityError::UnknownKey(key.to_string()))?;
        let actual = &candidate.series;
        let midpoint = actual.len() / 2;
        let truncated = CapacitySeries::new(actual.points()[..midpoint].to_vec())
            .map_err(|_| SimilarityError::EmptyQuery {
                query: key.to_string(),
            })?;

        let pool = Self {
            config: SimilarityConfig {
                exclude_self: true,
                ..self.config.clone()
            },
            candidates: self.candidates.clone(),
        };
        let result = pool.project(key, &truncated)?;

        let errors: Vec<f64> = result
            .projection
            .iter()
            .filter_map(|p| actual.value_at(p.date).map(|v| (p.capacity - v).abs()))
            .collect();
        let mean_abs_error =
            (!errors.is_empty()).then(|| errors.iter().sum::<f64>() / errors.len() as f64);

        Ok(Backtest {
            result,
            mean_abs_error,
        })
    }

    fn to_neighbors(&self, ranked: &[Ranked]) -> Vec<Neighbor> {
        let distances: Vec<f64> = ranked.iter().map(|r| r.distance).collect();
        let weights = blend_weights(&distances);
        ranked
            .iter()
            .zip(weights)
            .map(|(r, weight)| Neighbor {
                key: self.candidates[r.index].key.clone(),
                distance: r.distance,
                weight,
            })
            .collect()
    }

    fn blend(&self, anchor: &SeriesPoint, ranked: &[Ranked]) -> Vec<ProjectedPoint> {
        // each neighbour's level at the alignment date; neighbours that do
        // not reach it cannot be re-anchored
        let anchored: Vec<(&Ranked, &CapacitySeries, f64)> = ranked
            .iter()
            .filter_map(|r| {
                let series = &self.candidates[r.index].series;
                series.value_at(anchor.date).map(|base| (r, series, base))
            })
            .collect();

        let step = u64::from(self.config.step_days);
        let steps = self.config.horizon_days / self.config.step_days;
        let mut projection = Vec::new();
        for i in 1..=u64::from(steps) {
            let Some(date) = anchor.date.checked_add_days(Days::new(step * i)) else {
                break;
            };
            let contributions: Vec<(f64, f64)> = anchored
                .iter()
                .filter_map(|(r, series, base)| {
                    series.value_at(date).map(|v| (r.distance, v - base))
                })
                .collect();
            if contributions.is_empty() {
                break;
            }

            let distances: Vec<f64> = contributions.iter().map(|(d, _)| *d).collect();
            let weights = blend_weights(&distances);
            let growth: f64 = contributions
                .iter()
                .zip(&weights)
                .map(|((_, g), w)| g * w)
                .sum();
            let lower = contributions.iter().map(|(_, g)| *g).fold(f64::INFINITY, f64::min);
            let upper = contributions.iter().map(|(_, g)| *g).fold(f64::NEG_INFINITY, f64::max);

            projection.push(ProjectedPoint {
                date,
                capacity: anchor.capacity + growth,
                lower: anchor.capacity + lower,
                upper: anchor.capacity + upper,
                contributors: contributions.len(),
            });
        }
        projection
    }
}

/// Reciprocal-distance weights summing to one. The first zero distance
/// takes the whole weight.
pub fn blend_weights(distances: &[f64]) -> Vec<f64> {
    if let Some(exact) = distances.iter().position(|d| *d == 0.0) {
        return (0..distances.len())
            .map(|i| if i == exact { 1.0 } else { 0.0 })
            .collect();
    }
    let inverse: Vec<f64> = distances.iter().map(|d| 1.0 / d).collect();
    let total: f64 = inverse.iter().sum();
    inverse.iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).expect("valid date")
    }

    fn series(pairs: &[(NaiveDate, f64)]) -> CapacitySeries {
        CapacitySeries::from_pairs(pairs.iter().copied()).expect("increasing dates")
    }

    fn config(metric: DistanceMetric, k: usize) -> SimilarityConfig {
        SimilarityConfig {
            metric,
            k,
            horizon_days: 366,
            step_days: 30,
            exclude_self: true,
        }
    }

    #[test]
    fn weights_are_reciprocal_and_normalized() {
        let w = blend_weights(&[1.0, 3.0]);
        assert!((w[0] - 0.75).abs() < 1e-12);
        assert!((w[1] - 0.25).abs() < 1e-12);
        assert_eq!(blend_weights(&[2.0, 0.0, 0.0]), vec![0.0, 1.0, 0.0]);
        assert_eq!(blend_weights(&[4.0]), vec![1.0]);
    }

    #[test]
    fn single_point_example() {
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Absolute, 1));
        engine.push("facility", series(&[(d(2020, 1), 100.0)]));
        let result = engine
            .project("query", &series(&[(d(2020, 1), 50.0)]))
            .expect("projection");
        let neighbors = &result.neighbors;
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].key, "facility");
        assert_eq!(neighbors[0].distance, 50.0);
        assert_eq!(neighbors[0].weight, 1.0);
        // nothing past the shared month to continue from
        assert!(!result.is_projected());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Absolute, 3));
        engine.push("b", series(&[(d(2020, 1), 12.0)]));
        engine.push("a", series(&[(d(2020, 1), 8.0)]));
        engine.push("c", series(&[(d(2020, 1), 11.0)]));
        let keys: Vec<String> = engine
            .nearest("q", &series(&[(d(2020, 1), 10.0)]))
            .expect("neighbours")
            .into_iter()
            .map(|n| n.key)
            .collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
    }

    #[test]
    fn excludes_self_by_key() {
        let s = series(&[(d(2020, 1), 1.0), (d(2020, 6), 2.0)]);
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Euclidean, 5));
        engine.push("self", s.clone());
        engine.push("other", s.scaled(2.0));
        let keys: Vec<String> = engine
            .nearest("self", &s)
            .expect("neighbours")
            .into_iter()
            .map(|n| n.key)
            .collect();
        assert_eq!(keys, vec!["other"]);

        let mut with_self = engine.clone();
        with_self.config.exclude_self = false;
        let first = with_self.nearest("self", &s).expect("neighbours");
        assert_eq!(first[0].key, "self");
        assert_eq!(first[0].distance, 0.0);
    }

    #[test]
    fn empty_query_is_a_named_error() {
        let mut engine = SimilarityEngine::new(SimilarityConfig::default());
        engine.push("a", series(&[(d(2020, 1), 1.0)]));
        let err = engine.project("q", &CapacitySeries::default());
        assert!(matches!(err, Err(SimilarityError::EmptyQuery { .. })));
    }

    #[test]
    fn no_overlap_is_a_named_error() {
        let mut engine = SimilarityEngine::new(SimilarityConfig::default());
        engine.push("a", series(&[(d(2015, 1), 1.0), (d(2016, 1), 2.0)]));
        let err = engine.project("q", &series(&[(d(2020, 1), 1.0)]));
        assert!(matches!(err, Err(SimilarityError::NoEligibleCandidates { .. })));
    }

    #[test]
    fn k_zero_gives_unprojected_result() {
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Euclidean, 0));
        engine.push("a", series(&[(d(2020, 1), 1.0), (d(2021, 1), 5.0)]));
        let q = series(&[(d(2020, 1), 1.0), (d(2020, 3), 2.0)]);
        let result = engine.project("q", &q).expect("projection");
        assert!(result.neighbors.is_empty());
        assert_eq!(result.projected_series(), q);
    }

    #[test]
    fn single_neighbour_continuation_is_reanchored() {
        let neighbour = series(&[(d(2020, 1), 10.0), (d(2020, 7), 40.0), (d(2021, 1), 100.0)]);
        let q = series(&[(d(2020, 1), 1.0), (d(2020, 7), 4.0)]);
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Cosine, 1));
        engine.push("n", neighbour.clone());
        let projection = engine.project("q", &q).expect("projection").projection;
        assert!(!projection.is_empty());
        for p in &projection {
            let expected = 4.0 + (neighbour.value_at(p.date).expect("neighbour covers projection date") - 40.0);
            assert_eq!(p.capacity, expected);
            assert_eq!(p.lower, p.upper);
        }
        // projection stops where the neighbour's data end
        assert!(projection.iter().all(|p| p.date <= d(2021, 1)));
    }

    #[test]
    fn blend_uses_only_covering_neighbours() {
        let q = series(&[(d(2020, 1), 0.0), (d(2020, 3), 2.0)]);
        let short = series(&[(d(2020, 1), 0.0), (d(2020, 3), 2.0), (d(2020, 5), 4.0)]);
        let long = series(&[(d(2020, 1), 0.0), (d(2020, 3), 3.0), (d(2021, 3), 30.0)]);
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Euclidean, 2));
        engine.push("short", short);
        engine.push("long", long.clone());
        let projection = engine.project("q", &q).expect("projection").projection;
        let late: Vec<_> = projection.iter().filter(|p| p.date > d(2020, 5)).collect();
        assert!(!late.is_empty(), "long neighbour should carry the projection past May");
        for p in late {
            assert_eq!(p.contributors, 1);
            let expected = 2.0 + long.value_at(p.date).expect("long covers late dates") - 3.0;
            assert!((p.capacity - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn distance_matrix_is_symmetric_with_zero_diagonal() {
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Euclidean, 3));
        engine.push("a", series(&[(d(2020, 1), 1.0), (d(2020, 9), 3.0)]));
        engine.push("b", series(&[(d(2020, 2), 2.0), (d(2020, 12), 6.0)]));
        engine.push("c", series(&[(d(2010, 1), 1.0)]));
        let m = engine.distance_matrix();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
        assert_eq!(m.get(0, 0), Some(0.0));
        assert_eq!(m.get(0, 2), None);
        assert_eq!(m.closest_pair().map(|(i, j, _)| (i, j)), Some((0, 1)));
    }

    #[test]
    fn backtest_scores_projection() {
        let base = series(&[
            (d(2020, 1), 0.0),
            (d(2020, 4), 3.0),
            (d(2020, 7), 6.0),
            (d(2020, 10), 9.0),
        ]);
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Correlation, 1));
        engine.push("target", base.clone());
        engine.push("twin", base.scaled(2.0));
        let bt = engine.backtest("target").expect("backtest");
        assert_eq!(bt.result.neighbors[0].key, "twin");
        assert!(bt.mean_abs_error.is_some());
    }

    #[test]
    fn unknown_key_is_reported() {
        let engine = SimilarityEngine::new(SimilarityConfig::default());
        assert!(matches!(
            engine.project_key("missing"),
            Err(SimilarityError::UnknownKey(_))
        ));
    }

    #[test]
    fn projection_is_deterministic() {
        let mut engine = SimilarityEngine::new(config(DistanceMetric::Euclidean, 2));
        engine.push("a", series(&[(d(2020, 1), 1.0), (d(2021, 6), 9.0)]));
        engine.push("b", series(&[(d(2020, 1), 2.0), (d(2021, 9), 7.0)]));
        let q = series(&[(d(2020, 1), 1.5), (d(2020, 8), 3.0)]);
        let first = engine.project("q", &q).expect("first projection");
        let second = engine.project("q", &q).expect("second projection");
        assert!(first.is_projected());
        assert_eq!(first, second);
    }
}
