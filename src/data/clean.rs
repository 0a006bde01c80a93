//! Row validation, categorical normalization and cumulative capacity.

use std::fmt;

use chrono::NaiveDate;

use super::fuel::{normalize_fuel_tokens, title_case};
use super::loader::LoadedDataset;
use super::record::{CleanedRecord, FacilityRecord, RawFacility};

/// Counters describing what the cleaner kept and why rows were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Rows handed to the cleaner plus rows the loader could not decode.
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_malformed: usize,
    pub dropped_capacity: usize,
    pub dropped_date: usize,
    pub dropped_fuel: usize,
    /// Individual fuel tokens discarded from rows that were otherwise kept.
    pub fuel_tokens_discarded: usize,
}

impl CleanReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_malformed + self.dropped_capacity + self.dropped_date + self.dropped_fuel
    }
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Cleaning Report ---")?;
        writeln!(f, "Rows read:              {}", self.rows_read)?;
        writeln!(f, "Rows kept:              {}", self.rows_kept)?;
        writeln!(f, "Dropped (malformed):    {}", self.dropped_malformed)?;
        writeln!(f, "Dropped (capacity):     {}", self.dropped_capacity)?;
        writeln!(f, "Dropped (date):         {}", self.dropped_date)?;
        writeln!(f, "Dropped (fuel types):   {}", self.dropped_fuel)?;
        write!(f, "Fuel tokens discarded:  {}", self.fuel_tokens_discarded)
    }
}

/// Cleaned records in ascending approval-date order, each carrying the
/// running capacity total.
#[derive(Debug, Clone, Default)]
pub struct CleanedDataset {
    pub records: Vec<CleanedRecord>,
    pub report: CleanReport,
}

impl CleanedDataset {
    /// Builds a dataset from already-validated records, sorting them and
    /// deriving cumulative capacity.
    pub fn from_records(records: Vec<FacilityRecord>) -> Self {
        let rows_kept = records.len();
        Self {
            records: cumulate(records),
            report: CleanReport {
                rows_read: rows_kept,
                rows_kept,
                ..CleanReport::default()
            },
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn facilities(&self) -> impl Iterator<Item = &FacilityRecord> {
        self.records.iter().map(|r| &r.record)
    }

    /// Records approved in `[start, end)`; either bound may be open.
    pub fn within(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> impl Iterator<Item = &FacilityRecord> {
        self.facilities().filter(move |r| {
            start.is_none_or(|s| r.approval_date >= s) && end.is_none_or(|e| r.approval_date < e)
        })
    }
}

/// Validates and normalizes loaded rows, then derives cumulative capacity.
///
/// Rows with a missing or negative capacity, a missing approval date or no
/// usable fuel type are dropped. Unusable fuel tokens are discarded without
/// dropping the row unless none remain.
pub fn clean(loaded: LoadedDataset) -> CleanedDataset {
    let mut report = CleanReport {
        rows_read: loaded.rows.len() + loaded.malformed,
        dropped_malformed: loaded.malformed,
        ..CleanReport::default()
    };

    let mut records = Vec::with_capacity(loaded.rows.len());
    for raw in loaded.rows {
        if let Some(record) = validate(raw, &mut report) {
            records.push(record);
        }
    }
    report.rows_kept = records.len();

    log::info!(
        "kept {} of {} rows ({} dropped)",
        report.rows_kept,
        report.rows_read,
        report.rows_dropped()
    );

    CleanedDataset {
        records: cumulate(records),
        report,
    }
}

fn validate(raw: RawFacility, report: &mut CleanReport) -> Option<FacilityRecord> {
    let Some(capacity) = raw.nameplate_capacity_kw.filter(|c| *c >= 0.0) else {
        log::debug!("row {}: missing or negative capacity", raw.id);
        report.dropped_capacity += 1;
        return None;
    };
    let Some(approval_date) = raw.approval_date else {
        log::debug!("row {}: unparseable approval date", raw.id);
        report.dropped_date += 1;
        return None;
    };
    let (fuel_types, discarded) = normalize_fuel_tokens(&raw.fuel_tokens);
    if fuel_types.is_empty() {
        log::debug!("row {}: no usable fuel type in {:?}", raw.id, raw.fuel_tokens);
        report.dropped_fuel += 1;
        return None;
    }
    report.fuel_tokens_discarded += discarded;

    Some(FacilityRecord {
        id: raw.id,
        utility: raw.utility.trim().to_string(),
        nameplate_capacity_kw: capacity,
        fuel_types,
        city: title_case(&raw.city),
        county: title_case(&raw.county),
        caiso: raw.caiso,
        zipcode: raw.zipcode,
        sector: title_case(&raw.sector),
        approval_date,
    })
}

/// Stable sort by approval date followed by a prefix sum of capacity.
fn cumulate(mut records: Vec<FacilityRecord>) -> Vec<CleanedRecord> {
    records.sort_by_key(|r| r.approval_date);
    let mut total = 0.0;
    records
        .into_iter()
        .map(|record| {
            total += record.nameplate_capacity_kw;
            CleanedRecord {
                record,
                cumulative_capacity_kw: total,
            }
        })
        .collect()
}
