//! Error types shared across the explorer.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::series::SeriesError;
use crate::similarity::SimilarityError;

/// Result alias for fallible explorer operations.
pub type Result<T> = std::result::Result<T, ExplorerError>;

/// Top-level error for loading, analysing and exporting a dataset.
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("series error: {0}")]
    Series(#[from] SeriesError),
    #[error("similarity error: {0}")]
    Similarity(#[from] SimilarityError),
    #[error("dataset has no usable rows after cleaning")]
    EmptyDataset,
}
