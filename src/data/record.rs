//! Facility records as loaded from the source file and after cleaning.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable identifier assigned at load time: the record's position in the
/// source file (header excluded, zero-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FacilityId(pub u32);

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized fuel-type label such as `Solar`, `Battery` or `Natural Gas`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuelType(String);

impl FuelType {
    /// Wraps an already-normalized label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FuelType {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// One row of the source file after positional decoding and type coercion.
///
/// Fields the coercion could not make sense of are `None`; deciding whether
/// the row survives is left to the cleaner.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFacility {
    pub id: FacilityId,
    pub utility: String,
    pub nameplate_capacity_kw: Option<f64>,
    /// Fuel-type tokens exactly as split from the source column.
    pub fuel_tokens: Vec<String>,
    pub city: String,
    pub county: String,
    pub caiso: Option<bool>,
    pub zipcode: Option<u32>,
    pub sector: String,
    pub approval_date: Option<NaiveDate>,
}

/// A validated facility. Immutable once produced by the cleaner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityRecord {
    pub id: FacilityId,
    pub utility: String,
    /// Nameplate capacity in kW AC, never negative.
    pub nameplate_capacity_kw: f64,
    /// Distinct fuel types in source order, between one and four entries.
    pub fuel_types: Vec<FuelType>,
    pub city: String,
    pub county: String,
    pub caiso: Option<bool>,
    pub zipcode: Option<u32>,
    pub sector: String,
    pub approval_date: NaiveDate,
}

impl FacilityRecord {
    /// Fuel types as a set, for exclusive/inclusive matching.
    pub fn fuel_set(&self) -> BTreeSet<&FuelType> {
        self.fuel_types.iter().collect()
    }

    pub fn has_fuel(&self, fuel: &FuelType) -> bool {
        self.fuel_types.contains(fuel)
    }
}

/// A facility together with the dataset-wide running total of capacity up
/// to and including it, in approval-date order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRecord {
    #[serde(flatten)]
    pub record: FacilityRecord,
    pub cumulative_capacity_kw: f64,
}
