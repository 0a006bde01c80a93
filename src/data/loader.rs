//! Reads the facility file into memory and coerces column types.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::fuel::split_fuel_tokens;
use super::record::{FacilityId, RawFacility};
use crate::error::Result;

/// Date layouts seen in the source, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Positional column layout of the source file. The header row is ignored,
/// so renamed headers do not matter as long as the order holds.
#[derive(Debug, Deserialize)]
struct SourceRow {
    utility: String,
    nameplate_capacity: String,
    fuel_types: String,
    facility_city: String,
    facility_county: String,
    caiso_flag: String,
    facility_zipcode: String,
    customer_sector: String,
    approval_date: String,
}

/// Rows decoded from a source file plus the count of rows that could not be
/// decoded at all.
#[derive(Debug, Clone, Default)]
pub struct LoadedDataset {
    pub rows: Vec<RawFacility>,
    /// Rows skipped because the CSV layer could not decode them.
    pub malformed: usize,
}

/// Loads a facility file from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its header cannot be
/// read. Individual bad rows are skipped and counted instead.
pub fn load_path(path: &Path) -> Result<LoadedDataset> {
    log::info!("loading facility records from {}", path.display());
    let file = File::open(path)?;
    load_reader(io::BufReader::new(file))
}

/// Loads facility records from any reader producing delimited text.
///
/// # Errors
///
/// Returns an error if the header row cannot be read.
pub fn load_reader(reader: impl Read) -> Result<LoadedDataset> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    rdr.headers()?;

    let mut loaded = LoadedDataset::default();
    for (position, result) in rdr.records().enumerate() {
        let id = FacilityId(position as u32);
        let row = result
            .map_err(|e| e.to_string())
            .and_then(|record| {
                record
                    .deserialize::<SourceRow>(None)
                    .map_err(|e| e.to_string())
            });
        match row {
            Ok(row) => loaded.rows.push(coerce(id, row)),
            Err(e) => {
                log::debug!("skipping malformed row {id}: {e}");
                loaded.malformed += 1;
            }
        }
    }

    if loaded.malformed > 0 {
        log::warn!("skipped {} malformed rows", loaded.malformed);
    }
    log::info!("decoded {} rows", loaded.rows.len());
    Ok(loaded)
}

fn coerce(id: FacilityId, row: SourceRow) -> RawFacility {
    RawFacility {
        id,
        utility: row.utility,
        nameplate_capacity_kw: parse_capacity(&row.nameplate_capacity),
        fuel_tokens: split_fuel_tokens(&row.fuel_types),
        city: row.facility_city,
        county: row.facility_county,
        caiso: parse_flag(&row.caiso_flag),
        zipcode: parse_zipcode(&row.facility_zipcode),
        sector: row.customer_sector,
        approval_date: parse_date(&row.approval_date),
    }
}

/// Parses a capacity figure, tolerating thousands separators.
pub fn parse_capacity(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a calendar date in any of the layouts the source uses; a time of
/// day, if present, is discarded.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Extracts a five-digit zip code from values like `95014`, `95014-1234`
/// or `95014.0`.
pub fn parse_zipcode(raw: &str) -> Option<u32> {
    let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).take(5).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parses the CAISO flag; anything unrecognized is unknown.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Utility,Nameplate Capacity (kW AC),Fuel Types,City,County,CAISO,Zip,Sector,App Approved Date\n";

    #[test]
    fn loads_rows_positionally() {
        let csv = format!(
            "{HEADER}PG&E,\"1,250.5\",Solar_ Battery,Fresno,FRESNO,Yes,93701,Residential,2020-03-15\n"
        );
        let loaded = load_reader(csv.as_bytes()).expect("in-memory CSV loads");
        assert_eq!(loaded.rows.len(), 1);
        let row = &loaded.rows[0];
        assert_eq!(row.id, FacilityId(0));
        assert_eq!(row.nameplate_capacity_kw, Some(1250.5));
        assert_eq!(row.fuel_tokens, vec!["Solar", "Battery"]);
        assert_eq!(row.caiso, Some(true));
        assert_eq!(row.zipcode, Some(93701));
        assert_eq!(row.approval_date, NaiveDate::from_ymd_opt(2020, 3, 15));
    }

    #[test]
    fn short_rows_count_as_malformed() {
        let csv = format!(
            "{HEADER}PG&E,10,Solar\nSCE,5,Battery,Irvine,Orange,No,92618,Commercial,01/02/2019\n"
        );
        let loaded = load_reader(csv.as_bytes()).expect("in-memory CSV loads");
        assert_eq!(loaded.malformed, 1);
        assert_eq!(loaded.rows.len(), 1);
        // ids keep source positions even when earlier rows are skipped
        assert_eq!(loaded.rows[0].id, FacilityId(1));
    }

    #[test]
    fn unparseable_fields_become_none() {
        let csv = format!("{HEADER}SDG&E,n/a,Solar,San Diego,San Diego,?,unknown,Residential,soon\n");
        let loaded = load_reader(csv.as_bytes()).expect("in-memory CSV loads");
        let row = &loaded.rows[0];
        assert_eq!(row.nameplate_capacity_kw, None);
        assert_eq!(row.caiso, None);
        assert_eq!(row.zipcode, None);
        assert_eq!(row.approval_date, None);
    }

    #[test]
    fn date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2019, 1, 2);
        assert_eq!(parse_date("2019-01-02"), expected);
        assert_eq!(parse_date("01/02/2019"), expected);
        assert_eq!(parse_date("2019-01-02 13:45:00"), expected);
        assert_eq!(parse_date("2019-01-02T13:45:00"), expected);
        assert_eq!(parse_date("1/2/2019 13:45"), expected);
        assert_eq!(parse_date("2019-13-02"), None);
    }

    #[test]
    fn zipcode_variants() {
        assert_eq!(parse_zipcode("95014-1234"), Some(95014));
        assert_eq!(parse_zipcode("95014.0"), Some(95014));
        assert_eq!(parse_zipcode(""), None);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_path(Path::new("definitely/not/here.csv")).is_err());
    }
}
