//! TOML-based analysis configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::analysis::MatchMode;
use crate::analysis::pairs::PairOptions;
use crate::analysis::query::{GroupBy, GroupQuery, SelectFrom};
use crate::data::fuel::normalize_fuel_token;
use crate::similarity::{DistanceMetric, SimilarityConfig};

/// Top-level analysis configuration parsed from TOML.
///
/// Every section has defaults. Load from TOML with
/// [`AnalysisConfig::from_toml_file`] or pick a built-in preset with
/// [`AnalysisConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Input file, output directory and approval window.
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Facility filter and grouping for capacity series.
    #[serde(default)]
    pub query: QueryConfig,
    /// Gaussian smoothing of capacity series.
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    /// Fuel-pair aggregation.
    #[serde(default)]
    pub pairs: PairsConfig,
    /// Nearest-neighbour search and projection.
    #[serde(default)]
    pub similarity: SimilaritySection,
    /// Zip-code map and top cities.
    #[serde(default)]
    pub map: MapConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// Source CSV. The `--data` flag overrides it.
    pub path: Option<PathBuf>,
    /// Directory receiving the derived tables.
    pub output_dir: PathBuf,
    /// First approval date considered (inclusive, `YYYY-MM-DD`).
    pub start_date: Option<NaiveDate>,
    /// Approval date bound (exclusive, `YYYY-MM-DD`).
    pub end_date: Option<NaiveDate>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            output_dir: PathBuf::from("out"),
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Fuel labels; normalized the same way as the dataset. Empty disables
    /// the fuel filter.
    pub fuel_types: Vec<String>,
    pub mode: MatchMode,
    pub sector: Option<String>,
    pub group_by: GroupBy,
    /// Number of groups kept; all when unset.
    pub n_groups: Option<usize>,
    pub select_from: SelectFrom,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            fuel_types: vec!["Battery".to_string()],
            mode: MatchMode::Exclusive,
            sector: Some("Residential".to_string()),
            group_by: GroupBy::Zipcode,
            n_groups: Some(10),
            select_from: SelectFrom::Highest,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmoothingConfig {
    /// Resampling step (days, > 0).
    pub delta_days: u32,
    /// Gaussian kernel standard deviation (days, > 0).
    pub sigma_days: u32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            delta_days: 7,
            sigma_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PairsConfig {
    pub mode: MatchMode,
    /// Split a facility's capacity evenly over its fuel types.
    pub shared: bool,
    pub max_fuel_types: Option<usize>,
    pub include_self_pairs: bool,
}

impl Default for PairsConfig {
    fn default() -> Self {
        let options = PairOptions::default();
        Self {
            mode: options.mode,
            shared: options.shared,
            max_fuel_types: options.max_fuel_types,
            include_self_pairs: options.include_self_pairs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimilaritySection {
    pub metric: DistanceMetric,
    /// Number of neighbours blended into the projection.
    pub k: usize,
    pub horizon_days: u32,
    /// Grid step for distances and projection (days, > 0).
    pub step_days: u32,
    pub exclude_self: bool,
    /// Compare curves scaled to a final value of 1.
    pub normalize: bool,
    /// Group key to project. The closest pair of groups is used when unset.
    pub query: Option<String>,
}

impl Default for SimilaritySection {
    fn default() -> Self {
        let engine = SimilarityConfig::default();
        Self {
            metric: engine.metric,
            k: engine.k,
            horizon_days: engine.horizon_days,
            step_days: engine.step_days,
            exclude_self: engine.exclude_self,
            normalize: false,
            query: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    pub sector: Option<String>,
    pub top_cities: usize,
    /// `postal_code,latitude,longitude` CSV used to place zip codes.
    pub gazetteer: Option<PathBuf>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            sector: Some("Residential".to_string()),
            top_cities: 5,
            gazetteer: None,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"smoothing.sigma_days"`).
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl AnalysisConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = &["default", "capacity_series", "similarity", "fuel_pairs"];

    /// Cumulative residential battery capacity of the 20 largest zip codes,
    /// smoothed over a two-month kernel.
    pub fn capacity_series() -> Self {
        Self {
            query: QueryConfig {
                n_groups: Some(20),
                ..QueryConfig::default()
            },
            smoothing: SmoothingConfig {
                delta_days: 7,
                sigma_days: 60,
            },
            ..Self::default()
        }
    }

    /// Cities compared by curve shape, projected two years ahead.
    pub fn similarity() -> Self {
        Self {
            query: QueryConfig {
                group_by: GroupBy::City,
                n_groups: Some(25),
                ..QueryConfig::default()
            },
            similarity: SimilaritySection {
                metric: DistanceMetric::Correlation,
                k: 5,
                horizon_days: 730,
                normalize: true,
                ..SimilaritySection::default()
            },
            ..Self::default()
        }
    }

    /// Inclusive pair matrix over facilities with up to three fuel types,
    /// capacity shared between fuels.
    pub fn fuel_pairs() -> Self {
        Self {
            pairs: PairsConfig {
                mode: MatchMode::Inclusive,
                shared: true,
                max_fuel_types: Some(3),
                include_self_pairs: true,
            },
            ..Self::default()
        }
    }

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::default()),
            "capacity_series" => Ok(Self::capacity_series()),
            "similarity" => Ok(Self::similarity()),
            "fuel_pairs" => Ok(Self::fuel_pairs()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut fail = |field: &str, message: String| {
            errors.push(ConfigError {
                field: field.to_string(),
                message,
            });
        };

        let d = &self.dataset;
        if let (Some(start), Some(end)) = (d.start_date, d.end_date)
            && start >= end
        {
            fail("dataset.start_date", "must be before dataset.end_date".into());
        }
        if d.output_dir.as_os_str().is_empty() {
            fail("dataset.output_dir", "must not be empty".into());
        }

        let q = &self.query;
        for label in &q.fuel_types {
            if normalize_fuel_token(label).is_none() {
                fail(
                    "query.fuel_types",
                    format!("\"{label}\" is not a usable fuel type"),
                );
            }
        }
        if q.n_groups == Some(0) {
            fail("query.n_groups", "must be > 0 when set".into());
        }

        let sm = &self.smoothing;
        if sm.delta_days == 0 {
            fail("smoothing.delta_days", "must be > 0".into());
        }
        if sm.sigma_days == 0 {
            fail("smoothing.sigma_days", "must be > 0".into());
        }

        if self.pairs.max_fuel_types == Some(0) {
            fail("pairs.max_fuel_types", "must be > 0 when set".into());
        }

        let sim = &self.similarity;
        if sim.step_days == 0 {
            fail("similarity.step_days", "must be > 0".into());
        }
        if sim.step_days > 0 && sim.horizon_days > 0 && sim.horizon_days < sim.step_days {
            fail(
                "similarity.horizon_days",
                "must be 0 or >= similarity.step_days".into(),
            );
        }

        if self.map.top_cities == 0 {
            fail("map.top_cities", "must be > 0".into());
        }

        errors
    }

    /// Fuel labels of `[query]` in dataset form. Unusable labels are dropped;
    /// [`validate`](Self::validate) reports them.
    pub fn query_fuel_types(&self) -> Vec<crate::data::FuelType> {
        let mut fuels: Vec<_> = self
            .query
            .fuel_types
            .iter()
            .filter_map(|label| normalize_fuel_token(label))
            .collect();
        fuels.sort();
        fuels.dedup();
        fuels
    }

    pub fn group_query(&self) -> GroupQuery {
        let q = &self.query;
        GroupQuery {
            fuel_types: self.query_fuel_types(),
            mode: q.mode,
            sector: q.sector.clone(),
            group_by: q.group_by,
            n_groups: q.n_groups,
            select_from: q.select_from,
            start: self.dataset.start_date,
            end: self.dataset.end_date,
        }
    }

    pub fn pair_options(&self) -> PairOptions {
        let p = &self.pairs;
        PairOptions {
            mode: p.mode,
            shared: p.shared,
            max_fuel_types: p.max_fuel_types,
            include_self_pairs: p.include_self_pairs,
        }
    }

    pub fn similarity_config(&self) -> SimilarityConfig {
        let s = &self.similarity;
        SimilarityConfig {
            metric: s.metric,
            k: s.k,
            horizon_days: s.horizon_days,
            step_days: s.step_days,
            exclude_self: s.exclude_self,
        }
    }
}
