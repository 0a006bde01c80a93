//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::NaiveDate;
use es_explorer::data::{CleanedDataset, FacilityId, FacilityRecord, FuelType};
use es_explorer::runner::load_dataset;
use es_explorer::series::CapacitySeries;

/// Rows in `energy_storage_sample.csv`, header excluded.
pub const SAMPLE_ROWS: usize = 172;

/// Absolute path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The cleaned sample dataset.
pub fn sample_dataset() -> CleanedDataset {
    load_dataset(&fixture("energy_storage_sample.csv")).expect("sample fixture should load")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A residential facility with the given capacity, approval date and fuels.
pub fn facility(id: u32, kw: f64, approved: NaiveDate, fuels: &[&str]) -> FacilityRecord {
    FacilityRecord {
        id: FacilityId(id),
        utility: "PG&E".to_string(),
        nameplate_capacity_kw: kw,
        fuel_types: fuels.iter().map(|f| FuelType::from(*f)).collect(),
        city: "Oakland".to_string(),
        county: "Alameda".to_string(),
        caiso: Some(true),
        zipcode: Some(94607),
        sector: "Residential".to_string(),
        approval_date: approved,
    }
}

/// Series with one point per month starting January 2020, values from `f`.
pub fn monthly(months: u32, f: impl Fn(u32) -> f64) -> CapacitySeries {
    let points = (0..months).map(|i| (date(2020 + (i / 12) as i32, i % 12 + 1, 1), f(i)));
    CapacitySeries::from_pairs(points).expect("monthly series is increasing")
}
