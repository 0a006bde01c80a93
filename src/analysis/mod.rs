//! Aggregations over cleaned facility records.

/// Approval counts per fuel type and year.
pub mod approvals;
/// Zip-code coordinates and top-city summaries.
pub mod geo;
/// Mean capacity per fuel-type pair.
pub mod pairs;
pub mod query;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data::{FacilityRecord, FuelType};

/// How a set of fuel types is matched against a facility's fuel types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// The facility's fuel set equals the requested set.
    #[default]
    Exclusive,
    /// The requested set is a subset of the facility's fuel set.
    Inclusive,
}

impl MatchMode {
    /// Whether `record` matches `fuels` under this mode. An empty request
    /// matches every record inclusively and none exclusively.
    pub fn matches(self, record: &FacilityRecord, fuels: &[FuelType]) -> bool {
        let wanted: BTreeSet<&FuelType> = fuels.iter().collect();
        match self {
            Self::Exclusive => record.fuel_set() == wanted,
            Self::Inclusive => wanted.iter().all(|f| record.has_fuel(f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::data::FacilityId;

    fn record(fuels: &[&str]) -> FacilityRecord {
        FacilityRecord {
            id: FacilityId(0),
            utility: String::new(),
            nameplate_capacity_kw: 1.0,
            fuel_types: fuels.iter().map(|f| FuelType::from(*f)).collect(),
            city: String::new(),
            county: String::new(),
            caiso: None,
            zipcode: None,
            sector: String::new(),
            approval_date: NaiveDate::default(),
        }
    }

    fn fuels(labels: &[&str]) -> Vec<FuelType> {
        labels.iter().map(|f| FuelType::from(*f)).collect()
    }

    #[test]
    fn exclusive_requires_equal_sets() {
        let r = record(&["Battery", "Solar"]);
        assert!(MatchMode::Exclusive.matches(&r, &fuels(&["Solar", "Battery"])));
        assert!(!MatchMode::Exclusive.matches(&r, &fuels(&["Solar"])));
    }

    #[test]
    fn inclusive_requires_subset() {
        let r = record(&["Battery", "Solar", "Wind"]);
        assert!(MatchMode::Inclusive.matches(&r, &fuels(&["Solar", "Battery"])));
        assert!(!MatchMode::Inclusive.matches(&r, &fuels(&["Solar", "Hydro"])));
        assert!(MatchMode::Inclusive.matches(&r, &[]));
    }
}
