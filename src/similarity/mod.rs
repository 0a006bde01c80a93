//! Similarity between capacity-growth curves and trend projection.

pub mod engine;
pub mod metric;

use thiserror::Error;

pub use engine::{
    Backtest, Candidate, DistanceMatrix, Neighbor, ProjectedPoint, SimilarityConfig,
    SimilarityEngine, SimilarityResult, blend_weights,
};
pub use metric::{DistanceMetric, distance};

/// Conditions under which no similarity result can be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimilarityError {
    /// The query series has no points.
    #[error("query \"{query}\" has no data")]
    EmptyQuery { query: String },
    /// No candidate shares any dates with the query.
    #[error("no candidate overlaps query \"{query}\"")]
    NoEligibleCandidates { query: String },
    #[error("no candidate with key \"{0}\"")]
    UnknownKey(String),
    #[error("invalid similarity configuration: {0}")]
    InvalidConfig(String),
}
