//! CSV and JSON export of derived tables.
//!
//! Every table has a `write_*` function over any [`Write`] and the runner
//! routes them to files through [`export_file`]. Missing values are written
//! as `NA`. Output is deterministic for identical inputs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::analysis::approvals::ApprovalCounts;
use crate::analysis::geo::{CityCapacity, MapPoint};
use crate::analysis::pairs::{FuelPairMatrix, PairStat};
use crate::data::CleanedDataset;
use crate::error::Result;
use crate::series::{AccelerationPeaks, CapacitySeries};
use crate::similarity::{DistanceMatrix, SimilarityResult};

/// Marker for a missing value.
pub const NA: &str = "NA";

const CLEANED_HEADER: &str = "facility_id,utility,nameplate_capacity_kw,fuel_types,city,county,\
                              caiso,zipcode,customer_sector,approval_date,cumulative_capacity_kw";
const PAIRS_HEADER: &str = "fuel_a,fuel_b,mean_capacity_kw,facilities";
const APPROVALS_HEADER: &str = "fuel_type,year,approvals";
const SERIES_HEADER: &str = "group,kind,date,capacity_kw";
const PEAKS_HEADER: &str = "group,extremum,date,acceleration";
const PROJECTION_HEADER: &str = "kind,date,capacity_kw,lower_kw,upper_kw,contributors";
const MAP_HEADER: &str = "zipcode,latitude,longitude,city";
const CITIES_HEADER: &str = "city,total_capacity_kw,zipcodes";

/// A series tagged with its group and what it holds (`raw`, `smoothed`).
#[derive(Debug, Clone, Copy)]
pub struct NamedSeries<'a> {
    pub group: &'a str,
    pub kind: &'a str,
    pub series: &'a CapacitySeries,
}

/// Creates `path` and hands a buffered writer to `write`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or writing fails.
pub fn export_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(BufWriter<File>) -> Result<()>,
{
    let file = File::create(path)?;
    write(BufWriter::new(file))
}

fn writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().from_writer(out)
}

fn header<W: Write>(wtr: &mut csv::Writer<W>, columns: &str) -> Result<()> {
    wtr.write_record(columns.split(',').map(str::trim))?;
    Ok(())
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| NA.to_string(), |v| format!("{v:.4}"))
}

/// Cleaned records in approval order with their running capacity total.
pub fn write_cleaned_csv(dataset: &CleanedDataset, out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, CLEANED_HEADER)?;
    for row in &dataset.records {
        let r = &row.record;
        let fuels: Vec<&str> = r.fuel_types.iter().map(|f| f.as_str()).collect();
        wtr.write_record(&[
            r.id.to_string(),
            r.utility.clone(),
            format!("{:.3}", r.nameplate_capacity_kw),
            fuels.join(";"),
            r.city.clone(),
            r.county.clone(),
            r.caiso.map_or_else(|| NA.to_string(), |c| c.to_string()),
            r.zipcode.map_or_else(|| NA.to_string(), |z| format!("{z:05}")),
            r.sector.clone(),
            r.approval_date.to_string(),
            format!("{:.3}", row.cumulative_capacity_kw),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// One row per unordered fuel pair; pairs without data read `NA`.
pub fn write_pairs_csv(matrix: &FuelPairMatrix, out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, PAIRS_HEADER)?;
    for (a, b, stat) in matrix.pairs() {
        wtr.write_record(&[
            a.to_string(),
            b.to_string(),
            stat.to_string(),
            match stat {
                PairStat::NoData => NA.to_string(),
                PairStat::Mean { count, .. } => count.to_string(),
            },
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Full fuel-by-year grid, zero where nothing was approved.
pub fn write_approvals_csv(counts: &ApprovalCounts, out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, APPROVALS_HEADER)?;
    let years = counts.years();
    for fuel in counts.fuel_types() {
        for &year in &years {
            wtr.write_record(&[
                fuel.to_string(),
                year.to_string(),
                counts.get(fuel, year).to_string(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_series_csv(series: &[NamedSeries<'_>], out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, SERIES_HEADER)?;
    for named in series {
        for p in named.series.points() {
            wtr.write_record(&[
                named.group.to_string(),
                named.kind.to_string(),
                p.date.to_string(),
                format!("{:.4}", p.capacity),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_peaks_csv(peaks: &[(String, AccelerationPeaks)], out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, PEAKS_HEADER)?;
    for (group, found) in peaks {
        let tagged = found
            .maxima
            .iter()
            .map(|p| ("max", p))
            .chain(found.minima.iter().map(|p| ("min", p)));
        for (extremum, peak) in tagged {
            wtr.write_record(&[
                group.clone(),
                extremum.to_string(),
                peak.date.to_string(),
                format!("{:.6}", peak.value),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Square matrix with a leading `key` column; `NA` where two series do not
/// overlap.
pub fn write_distance_matrix_csv(matrix: &DistanceMatrix, out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    wtr.write_record(std::iter::once("key").chain(matrix.keys.iter().map(String::as_str)))?;
    for (m, key) in matrix.keys.iter().enumerate() {
        let mut row = vec![key.clone()];
        row.extend((0..matrix.keys.len()).map(|n| opt(matrix.get(m, n))));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Observed query points followed by projected ones with their envelope.
pub fn write_projection_csv(result: &SimilarityResult, out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, PROJECTION_HEADER)?;
    for p in result.query_series.points() {
        wtr.write_record(&[
            "observed".to_string(),
            p.date.to_string(),
            format!("{:.4}", p.capacity),
            NA.to_string(),
            NA.to_string(),
            NA.to_string(),
        ])?;
    }
    for p in &result.projection {
        wtr.write_record(&[
            "projected".to_string(),
            p.date.to_string(),
            format!("{:.4}", p.capacity),
            format!("{:.4}", p.lower),
            format!("{:.4}", p.upper),
            p.contributors.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Pretty-printed JSON of any serializable report.
pub fn write_json(value: &impl Serialize, mut out: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

pub fn write_map_points_csv(points: &[MapPoint], out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, MAP_HEADER)?;
    for p in points {
        wtr.write_record(&[
            format!("{:05}", p.zipcode),
            opt(p.latitude),
            opt(p.longitude),
            p.city.clone().unwrap_or_else(|| NA.to_string()),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_top_cities_csv(cities: &[CityCapacity], out: impl Write) -> Result<()> {
    let mut wtr = writer(out);
    header(&mut wtr, CITIES_HEADER)?;
    for c in cities {
        let zips: Vec<String> = c.zipcodes.iter().map(|z| format!("{z:05}")).collect();
        wtr.write_record(&[
            c.city.clone(),
            format!("{:.3}", c.total_kw),
            zips.join(" "),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::analysis::pairs::{PairOptions, aggregate_pairs, fuel_labels};
    use crate::data::{FacilityId, FacilityRecord, FuelType};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn record(kw: f64, date: NaiveDate, fuels: &[&str]) -> FacilityRecord {
        FacilityRecord {
            id: FacilityId(3),
            utility: "SCE".to_string(),
            nameplate_capacity_kw: kw,
            fuel_types: fuels.iter().map(|f| FuelType::from(*f)).collect(),
            city: "Irvine".to_string(),
            county: "Orange".to_string(),
            caiso: Some(true),
            zipcode: Some(2618),
            sector: "Residential".to_string(),
            approval_date: date,
        }
    }

    fn render(write: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        write(&mut buf).expect("write succeeds");
        String::from_utf8(buf).expect("output is UTF-8")
    }

    #[test]
    fn cleaned_header_and_rows() {
        let data = CleanedDataset::from_records(vec![
            record(5.0, d(2020, 2, 1), &["Battery", "Solar"]),
            record(2.5, d(2020, 1, 1), &["Battery"]),
        ]);
        let output = render(|w| write_cleaned_csv(&data, w));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "facility_id,utility,nameplate_capacity_kw,fuel_types,city,county,\
             caiso,zipcode,customer_sector,approval_date,cumulative_capacity_kw"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("2020-01-01,2.500"));
        assert!(lines[2].contains("Battery;Solar"));
        assert!(lines[2].contains(",02618,"));
        assert!(lines[2].ends_with("7.500"));
    }

    #[test]
    fn no_data_pairs_export_as_na() {
        let records = vec![record(4.0, d(2020, 1, 1), &["Battery"])];
        let mut labels = fuel_labels(&records, None);
        labels.push(FuelType::from("Wind"));
        let matrix = aggregate_pairs(&records, &labels, &PairOptions::default());
        let output = render(|w| write_pairs_csv(&matrix, w));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "fuel_a,fuel_b,mean_capacity_kw,facilities");
        assert_eq!(lines[1], "Battery,Battery,4.0000,1");
        assert_eq!(lines[2], "Battery,Wind,NA,NA");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn approvals_fill_missing_years_with_zero() {
        let records = vec![
            record(1.0, d(2018, 1, 1), &["Battery"]),
            record(1.0, d(2020, 1, 1), &["Battery"]),
        ];
        let counts = ApprovalCounts::from_records(&records);
        let output = render(|w| write_approvals_csv(&counts, w));
        assert_eq!(
            output.lines().collect::<Vec<_>>(),
            vec![
                "fuel_type,year,approvals",
                "Battery,2018,1",
                "Battery,2019,0",
                "Battery,2020,1"
            ]
        );
    }

    #[test]
    fn distance_matrix_is_square_with_na() {
        let matrix = DistanceMatrix {
            keys: vec!["a".into(), "b".into()],
            values: vec![vec![Some(0.0), None], vec![None, Some(0.0)]],
        };
        let output = render(|w| write_distance_matrix_csv(&matrix, w));
        assert_eq!(
            output.lines().collect::<Vec<_>>(),
            vec!["key,a,b", "a,0.0000,NA", "b,NA,0.0000"]
        );
    }

    #[test]
    fn series_rows_carry_group_and_kind() {
        let series = CapacitySeries::cumulative([(d(2020, 1, 1), 1.0), (d(2020, 2, 1), 2.0)]);
        let named = [NamedSeries {
            group: "94110",
            kind: "raw",
            series: &series,
        }];
        let output = render(|w| write_series_csv(&named, w));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], SERIES_HEADER);
        assert_eq!(lines[2], "94110,raw,2020-02-01,3.0000");
    }

    #[test]
    fn deterministic_output() {
        let data = CleanedDataset::from_records(
            (1..6)
                .map(|m| record(m as f64, d(2021, m, 1), &["Battery"]))
                .collect(),
        );
        let first = render(|w| write_cleaned_csv(&data, w));
        let second = render(|w| write_cleaned_csv(&data, w));
        assert_eq!(first, second);
    }

    #[test]
    fn map_points_without_coordinates() {
        let points = vec![MapPoint {
            zipcode: 95814,
            latitude: None,
            longitude: None,
            city: None,
        }];
        let output = render(|w| write_map_points_csv(&points, w));
        assert_eq!(output.lines().nth(1), Some("95814,NA,NA,NA"));
    }

    #[test]
    fn json_is_parseable() {
        let matrix = DistanceMatrix {
            keys: vec!["a".into()],
            values: vec![vec![Some(0.0)]],
        };
        let output = render(|w| write_json(&matrix, w));
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("valid JSON");
        assert_eq!(parsed["keys"][0], "a");
    }
}
