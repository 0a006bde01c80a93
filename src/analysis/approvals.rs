use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;

use crate::data::{FacilityRecord, FuelType};

/// Number of approvals per fuel type and calendar year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApprovalCounts {
    counts: BTreeMap<(FuelType, i32), usize>,
}

impl ApprovalCounts {
    /// Counts `records`; a facility with several fuel types counts once for
    /// each of them.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FacilityRecord>) -> Self {
        let mut counts = BTreeMap::new();
        for record in records {
            let year = record.approval_date.year();
            for fuel in record.fuel_set() {
                *counts.entry((fuel.clone(), year)).or_insert(0) += 1;
            }
        }
        Self { counts }
    }

    pub fn get(&self, fuel: &FuelType, year: i32) -> usize {
        self.counts.get(&(fuel.clone(), year)).copied().unwrap_or(0)
    }

    pub fn fuel_types(&self) -> Vec<&FuelType> {
        let set: BTreeSet<&FuelType> = self.counts.keys().map(|(f, _)| f).collect();
        set.into_iter().collect()
    }

    /// Every year between the first and last approval, including years
    /// without any.
    pub fn years(&self) -> Vec<i32> {
        let first = self.counts.keys().map(|(_, y)| *y).min();
        let last = self.counts.keys().map(|(_, y)| *y).max();
        match (first, last) {
            (Some(first), Some(last)) => (first..=last).collect(),
            _ => Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
