//! Exploratory analysis of California energy-storage facility approvals.

/// Fuel-pair, group, approval and geographic aggregations.
pub mod analysis;
pub mod config;
/// Loading, validation and cleaning of facility records.
pub mod data;
pub mod error;
pub mod io;
pub mod runner;
/// Capacity time series, smoothing and peak detection.
pub mod series;
pub mod similarity;
