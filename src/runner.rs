//! Command pipelines: each `run_*` derives one family of tables from a
//! cleaned dataset and writes them to the output directory.

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::analysis::approvals::ApprovalCounts;
use crate::analysis::geo::{self, MapPoint, ZipGazetteer};
use crate::analysis::pairs::{FuelPairMatrix, aggregate_pairs, fuel_labels};
use crate::analysis::query::{GroupSeries, query_groups};
use crate::config::AnalysisConfig;
use crate::data::{CleanedDataset, FacilityRecord, clean, load_path};
use crate::error::{ExplorerError, Result};
use crate::io::export::{self, NamedSeries, export_file};
use crate::series::{AccelerationPeaks, CapacitySeries, find_acceleration_peaks};
use crate::similarity::{
    Backtest, Candidate, DistanceMatrix, SimilarityConfig, SimilarityEngine, SimilarityError,
    SimilarityResult,
};

/// Analysis to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Clean,
    Pairs,
    Approvals,
    Series,
    Similarity,
    Map,
    All,
}

impl Command {
    pub const NAMES: &[&str] = &[
        "clean",
        "pairs",
        "approvals",
        "series",
        "similarity",
        "map",
        "all",
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "clean" => Self::Clean,
            "pairs" => Self::Pairs,
            "approvals" => Self::Approvals,
            "series" => Self::Series,
            "similarity" => Self::Similarity,
            "map" => Self::Map,
            "all" => Self::All,
            _ => return None,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clean => "clean",
            Self::Pairs => "pairs",
            Self::Approvals => "approvals",
            Self::Series => "series",
            Self::Similarity => "similarity",
            Self::Map => "map",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// Loads and cleans the source file.
///
/// # Errors
///
/// Fails when the file cannot be read or holds no usable record.
pub fn load_dataset(path: &Path) -> Result<CleanedDataset> {
    let dataset = clean(load_path(path)?);
    info!(
        "{} of {} rows kept",
        dataset.report.rows_kept, dataset.report.rows_read
    );
    if dataset.is_empty() {
        return Err(ExplorerError::EmptyDataset);
    }
    Ok(dataset)
}

/// Paths of the tables written by one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub written: Vec<PathBuf>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Output ---")?;
        for path in &self.written {
            writeln!(f, "{}", path.display())?;
        }
        write!(f, "{} file(s) written", self.written.len())
    }
}

/// Writes one output table and records its path.
struct Output<'a> {
    dir: &'a Path,
    summary: RunSummary,
}

impl<'a> Output<'a> {
    fn new(dir: &'a Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir,
            summary: RunSummary::default(),
        })
    }

    fn write<F>(&mut self, name: &str, write: F) -> Result<()>
    where
        F: FnOnce(BufWriter<File>) -> Result<()>,
    {
        let path = self.dir.join(name);
        export_file(&path, write)?;
        info!("wrote {}", path.display());
        self.summary.written.push(path);
        Ok(())
    }
}

/// Everything the similarity step produced, serialized to
/// `similarity.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    pub config: SimilarityConfig,
    pub normalized: bool,
    pub result: SimilarityResult,
    pub backtest: Option<Backtest>,
}

/// Runs `command` against `dataset`, writing into `out_dir`.
///
/// # Errors
///
/// Propagates I/O failures and insufficient-data errors from the similarity
/// step.
pub fn run(
    command: Command,
    dataset: &CleanedDataset,
    config: &AnalysisConfig,
    out_dir: &Path,
) -> Result<RunSummary> {
    let mut out = Output::new(out_dir)?;
    let run_all = command == Command::All;

    if run_all || command == Command::Clean {
        run_clean(dataset, &mut out)?;
    }
    if run_all || command == Command::Pairs {
        let matrix = run_pairs(dataset, config, &mut out)?;
        info!("fuel pair matrix over {} fuel types", matrix.labels().len());
    }
    if run_all || command == Command::Approvals {
        let counts = run_approvals(dataset, config, &mut out)?;
        info!("{} approvals counted", counts.total());
    }
    if run_all || command == Command::Series {
        let groups = run_series(dataset, config, &mut out)?;
        info!("{} capacity series", groups.len());
    }
    if run_all || command == Command::Similarity {
        let report = run_similarity(dataset, config, &mut out)?;
        info!("\n{}", report.result);
    }
    if run_all || command == Command::Map {
        let points = run_map(dataset, config, &mut out)?;
        info!("{} zip codes mapped", points.len());
    }
    Ok(out.summary)
}

fn run_clean(dataset: &CleanedDataset, out: &mut Output<'_>) -> Result<()> {
    info!("\n{}", dataset.report);
    out.write("cleaned.csv", |w| export::write_cleaned_csv(dataset, w))
}

fn run_pairs(
    dataset: &CleanedDataset,
    config: &AnalysisConfig,
    out: &mut Output<'_>,
) -> Result<FuelPairMatrix> {
    let options = config.pair_options();
    let (start, end) = (config.dataset.start_date, config.dataset.end_date);
    let labels = fuel_labels(dataset.within(start, end), options.max_fuel_types);
    let matrix = aggregate_pairs(dataset.within(start, end), &labels, &options);
    out.write("fuel_pairs.csv", |w| export::write_pairs_csv(&matrix, w))?;
    Ok(matrix)
}

fn run_approvals(
    dataset: &CleanedDataset,
    config: &AnalysisConfig,
    out: &mut Output<'_>,
) -> Result<ApprovalCounts> {
    let d = &config.dataset;
    let counts = ApprovalCounts::from_records(dataset.within(d.start_date, d.end_date));
    out.write("approvals.csv", |w| export::write_approvals_csv(&counts, w))?;
    Ok(counts)
}

/// Smooths a group's cumulative curve over its own date range. Groups too
/// short for the kernel are reported and skipped.
fn smoothed(group: &GroupSeries, config: &AnalysisConfig) -> Option<CapacitySeries> {
    let (first, last) = (group.series.first()?, group.series.last()?);
    let end = last.date.succ_opt()?;
    let s = &config.smoothing;
    match group.series.smooth(first.date, end, s.delta_days, s.sigma_days) {
        Ok(series) => Some(series),
        Err(e) => {
            warn!("{}: not smoothed: {e}", group.key);
            None
        }
    }
}

fn run_series(
    dataset: &CleanedDataset,
    config: &AnalysisConfig,
    out: &mut Output<'_>,
) -> Result<Vec<GroupSeries>> {
    let groups = query_groups(dataset, &config.group_query());
    if groups.is_empty() {
        warn!("query matched no facilities");
    }

    let smooth: Vec<Option<CapacitySeries>> =
        groups.iter().map(|g| smoothed(g, config)).collect();
    let mut named = Vec::with_capacity(groups.len() * 2);
    let mut peaks: Vec<(String, AccelerationPeaks)> = Vec::new();
    for (group, smooth) in groups.iter().zip(&smooth) {
        named.push(NamedSeries {
            group: &group.key,
            kind: "raw",
            series: &group.series,
        });
        let Some(smooth) = smooth else { continue };
        named.push(NamedSeries {
            group: &group.key,
            kind: "smoothed",
            series: smooth,
        });
        match find_acceleration_peaks(smooth, config.smoothing.sigma_days) {
            Ok(found) => {
                info!(
                    "{}: {} growth spurts, {:.2} per year",
                    group.key,
                    found.maxima.len(),
                    found.frequency_per_year()
                );
                peaks.push((group.key.clone(), found));
            }
            Err(e) => warn!("{}: no peaks: {e}", group.key),
        }
    }

    out.write("series.csv", |w| export::write_series_csv(&named, w))?;
    out.write("peaks.csv", |w| export::write_peaks_csv(&peaks, w))?;
    Ok(groups)
}

/// Builds the candidate pool from the configured groups.
pub fn similarity_engine(groups: &[GroupSeries], config: &AnalysisConfig) -> SimilarityEngine {
    let normalize = config.similarity.normalize;
    SimilarityEngine::with_candidates(
        config.similarity_config(),
        groups.iter().map(|g| Candidate {
            key: g.key.clone(),
            series: if normalize {
                g.series.normalized()
            } else {
                g.series.clone()
            },
        }),
    )
}

/// Picks the configured query key, or the first member of the closest pair
/// of groups.
fn query_key(matrix: &DistanceMatrix, config: &AnalysisConfig) -> Result<String> {
    if let Some(key) = &config.similarity.query {
        return Ok(key.clone());
    }
    match matrix.closest_pair() {
        Some((m, n, d)) => {
            info!(
                "closest pair: {} and {} (distance {d:.4})",
                matrix.keys[m], matrix.keys[n]
            );
            Ok(matrix.keys[m].clone())
        }
        None => Err(SimilarityError::NoEligibleCandidates {
            query: matrix.keys.first().cloned().unwrap_or_default(),
        }
        .into()),
    }
}

fn run_similarity(
    dataset: &CleanedDataset,
    config: &AnalysisConfig,
    out: &mut Output<'_>,
) -> Result<SimilarityReport> {
    let groups = query_groups(dataset, &config.group_query());
    let engine = similarity_engine(&groups, config);

    let matrix = engine.distance_matrix();
    out.write("distance_matrix.csv", |w| {
        export::write_distance_matrix_csv(&matrix, w)
    })?;

    let key = query_key(&matrix, config)?;
    let result = engine.project_key(&key)?;
    let backtest = match engine.backtest(&key) {
        Ok(b) => {
            if let Some(mae) = b.mean_abs_error {
                info!("{key}: backtest mean absolute error {mae:.3}");
            }
            Some(b)
        }
        Err(e) => {
            warn!("{key}: backtest skipped: {e}");
            None
        }
    };

    let report = SimilarityReport {
        config: engine.config().clone(),
        normalized: config.similarity.normalize,
        result,
        backtest,
    };
    out.write("projection.csv", |w| {
        export::write_projection_csv(&report.result, w)
    })?;
    out.write("similarity.json", |w| export::write_json(&report, w))?;
    Ok(report)
}

fn run_map(
    dataset: &CleanedDataset,
    config: &AnalysisConfig,
    out: &mut Output<'_>,
) -> Result<Vec<MapPoint>> {
    let m = &config.map;
    let d = &config.dataset;
    let in_sector = |r: &&FacilityRecord| {
        m.sector
            .as_deref()
            .is_none_or(|s| r.sector.eq_ignore_ascii_case(s))
    };
    let zipcodes =
        geo::unique_zipcodes(dataset.within(d.start_date, d.end_date).filter(in_sector));
    let cities = geo::top_cities(
        dataset.within(d.start_date, d.end_date).filter(in_sector),
        m.top_cities,
    );
    let gazetteer = m
        .gazetteer
        .as_deref()
        .map(ZipGazetteer::from_path)
        .transpose()?;
    let points = geo::map_points(&zipcodes, gazetteer.as_ref(), &cities);

    let unplaced = points.iter().filter(|p| p.latitude.is_none()).count();
    if gazetteer.is_some() && unplaced > 0 {
        warn!("{unplaced} zip code(s) missing from the gazetteer");
    }

    out.write("map_points.csv", |w| export::write_map_points_csv(&points, w))?;
    out.write("top_cities.csv", |w| export::write_top_cities_csv(&cities, w))?;
    Ok(points)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::data::{FacilityId, FuelType};

    fn record(zip: u32, month: u32, kw: f64) -> FacilityRecord {
        FacilityRecord {
            id: FacilityId(0),
            utility: "PG&E".to_string(),
            nameplate_capacity_kw: kw,
            fuel_types: vec![FuelType::from("Battery")],
            city: format!("City {zip}"),
            county: String::new(),
            caiso: Some(true),
            zipcode: Some(zip),
            sector: "Residential".to_string(),
            approval_date: NaiveDate::from_ymd_opt(2020, month, 1).expect("valid date"),
        }
    }

    #[test]
    fn command_names_round_trip() {
        for name in Command::NAMES {
            let parsed = Command::from_name(name);
            assert_eq!(parsed.map(|c| c.to_string()).as_deref(), Some(*name));
        }
        assert_eq!(Command::from_name("plot"), None);
    }

    #[test]
    fn closest_pair_is_default_query() {
        let data = CleanedDataset::from_records(vec![
            record(90001, 1, 1.0),
            record(90001, 6, 1.0),
            record(90002, 1, 1.0),
            record(90002, 6, 1.1),
            record(90003, 1, 10.0),
            record(90003, 6, 30.0),
        ]);
        let config = AnalysisConfig::default();
        let groups = query_groups(&data, &config.group_query());
        let engine = similarity_engine(&groups, &config);
        let key = query_key(&engine.distance_matrix(), &config).expect("closest pair exists");
        assert!(key == "90001" || key == "90002", "got {key}");
    }

    #[test]
    fn configured_query_wins() {
        let mut config = AnalysisConfig::default();
        config.similarity.query = Some("90003".to_string());
        let matrix = DistanceMatrix {
            keys: Vec::new(),
            values: Vec::new(),
        };
        assert_eq!(query_key(&matrix, &config).ok().as_deref(), Some("90003"));
    }

    #[test]
    fn no_groups_is_insufficient_data() {
        let matrix = DistanceMatrix {
            keys: Vec::new(),
            values: Vec::new(),
        };
        let err = query_key(&matrix, &AnalysisConfig::default());
        assert!(matches!(
            err,
            Err(ExplorerError::Similarity(
                SimilarityError::NoEligibleCandidates { .. }
            ))
        ));
    }
}
