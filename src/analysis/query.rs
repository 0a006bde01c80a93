//! Grouped capacity queries.
//!
//! A query filters facilities by sector, fuel types and approval window,
//! groups them by a location or utility key and turns each group into a
//! cumulative [`CapacitySeries`]. Groups are ranked by total capacity so the
//! largest, smallest or median-sized groups can be selected.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::MatchMode;
use crate::data::{CleanedDataset, FacilityRecord, FuelType};
use crate::series::CapacitySeries;

/// Facility attribute that defines a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Zipcode,
    City,
    County,
    Utility,
}

impl GroupBy {
    pub const NAMES: &[&str] = &["zipcode", "city", "county", "utility"];

    /// Group key of `record`; `None` when the attribute is missing.
    pub fn key(self, record: &FacilityRecord) -> Option<String> {
        let text = match self {
            Self::Zipcode => return record.zipcode.map(|z| format!("{z:05}")),
            Self::City => &record.city,
            Self::County => &record.county,
            Self::Utility => &record.utility,
        };
        (!text.is_empty()).then(|| text.clone())
    }
}

/// Which end of the capacity ranking to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectFrom {
    #[default]
    Highest,
    Lowest,
    Middle,
}

/// Filter, grouping and selection for [`query_groups`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupQuery {
    /// Empty means no fuel filter.
    pub fuel_types: Vec<FuelType>,
    pub mode: MatchMode,
    /// Case-insensitive customer sector filter.
    pub sector: Option<String>,
    pub group_by: GroupBy,
    /// Number of groups to keep; all when `None`.
    pub n_groups: Option<usize>,
    pub select_from: SelectFrom,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl GroupQuery {
    pub fn accepts(&self, record: &FacilityRecord) -> bool {
        let sector_ok = self
            .sector
            .as_deref()
            .is_none_or(|s| record.sector.eq_ignore_ascii_case(s));
        let fuel_ok = self.fuel_types.is_empty() || self.mode.matches(record, &self.fuel_types);
        sector_ok && fuel_ok
    }
}

/// One selected group and its cumulative capacity curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSeries {
    pub key: String,
    pub total_kw: f64,
    pub facilities: usize,
    pub series: CapacitySeries,
}

/// Runs `query` against `dataset`.
///
/// The result is ordered by rank: descending total for `highest`,
/// ascending for `lowest` and `middle`. Ties keep key order.
pub fn query_groups(dataset: &CleanedDataset, query: &GroupQuery) -> Vec<GroupSeries> {
    let mut groups: BTreeMap<String, Vec<&FacilityRecord>> = BTreeMap::new();
    for record in dataset.within(query.start, query.end) {
        if !query.accepts(record) {
            continue;
        }
        if let Some(key) = query.group_by.key(record) {
            groups.entry(key).or_default().push(record);
        }
    }

    let mut ranked: Vec<GroupSeries> = groups
        .into_iter()
        .map(|(key, records)| GroupSeries {
            key,
            total_kw: records.iter().map(|r| r.nameplate_capacity_kw).sum(),
            facilities: records.len(),
            series: CapacitySeries::cumulative(
                records
                    .iter()
                    .map(|r| (r.approval_date, r.nameplate_capacity_kw)),
            ),
        })
        .collect();
    let n = query.n_groups.unwrap_or(ranked.len()).min(ranked.len());
    match query.select_from {
        SelectFrom::Highest => {
            ranked.sort_by(|a, b| b.total_kw.total_cmp(&a.total_kw));
            ranked.truncate(n);
            ranked
        }
        SelectFrom::Lowest => {
            ranked.sort_by(|a, b| a.total_kw.total_cmp(&b.total_kw));
            ranked.truncate(n);
            ranked
        }
        SelectFrom::Middle => {
            ranked.sort_by(|a, b| a.total_kw.total_cmp(&b.total_kw));
            let start = (ranked.len() - n) / 2;
            ranked.drain(start..start + n).collect()
        }
    }
}
