use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::data::FacilityRecord;
use crate::error::Result;

/// Zip code to coordinate lookup read from a `postal_code,latitude,longitude`
/// CSV.
#[derive(Debug, Clone, Default)]
pub struct ZipGazetteer {
    coords: HashMap<u32, (f64, f64)>,
}

#[derive(Deserialize)]
struct GazetteerRow {
    postal_code: String,
    latitude: f64,
    longitude: f64,
}

impl ZipGazetteer {
    pub fn from_path(path: &Path) -> Result<Self> {
        let gazetteer = Self::from_reader(File::open(path)?)?;
        info!(
            "loaded {} zip coordinates from {}",
            gazetteer.len(),
            path.display()
        );
        Ok(gazetteer)
    }

    /// Rows whose postal code is not numeric are skipped.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut coords = HashMap::new();
        for row in rdr.deserialize::<GazetteerRow>() {
            let row = row?;
            match row.postal_code.parse::<u32>() {
                Ok(zip) => {
                    coords.insert(zip, (row.latitude, row.longitude));
                }
                Err(_) => warn!("skipping gazetteer postal code {:?}", row.postal_code),
            }
        }
        Ok(Self { coords })
    }

    pub fn lookup(&self, zipcode: u32) -> Option<(f64, f64)> {
        self.coords.get(&zipcode).copied()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// A zip code placed on the map; coordinates are missing for zip codes the
/// gazetteer does not know.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub zipcode: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// City the zip code belongs to when it is among the top cities.
    pub city: Option<String>,
}

/// Total capacity installed in one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityCapacity {
    pub city: String,
    pub total_kw: f64,
    pub zipcodes: Vec<u32>,
}

/// Distinct zip codes in first-seen order.
pub fn unique_zipcodes<'a>(records: impl IntoIterator<Item = &'a FacilityRecord>) -> Vec<u32> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|r| r.zipcode)
        .filter(|zip| seen.insert(*zip))
        .collect()
}

/// The `n` cities with the largest total capacity, largest first. Ties keep
/// alphabetical order.
pub fn top_cities<'a>(
    records: impl IntoIterator<Item = &'a FacilityRecord>,
    n: usize,
) -> Vec<CityCapacity> {
    let mut cities: BTreeMap<&str, (f64, Vec<u32>)> = BTreeMap::new();
    for record in records {
        if record.city.is_empty() {
            continue;
        }
        let entry = cities.entry(record.city.as_str()).or_default();
        entry.0 += record.nameplate_capacity_kw;
        if let Some(zip) = record.zipcode
            && !entry.1.contains(&zip)
        {
            entry.1.push(zip);
        }
    }
    let mut ranked: Vec<CityCapacity> = cities
        .into_iter()
        .map(|(city, (total_kw, mut zipcodes))| {
            zipcodes.sort_unstable();
            CityCapacity {
                city: city.to_string(),
                total_kw,
                zipcodes,
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.total_kw.total_cmp(&a.total_kw));
    ranked.truncate(n);
    ranked
}

/// Places `zipcodes` using `gazetteer` and tags those belonging to one of
/// `cities`.
pub fn map_points(
    zipcodes: &[u32],
    gazetteer: Option<&ZipGazetteer>,
    cities: &[CityCapacity],
) -> Vec<MapPoint> {
    zipcodes
        .iter()
        .map(|&zipcode| {
            let coords = gazetteer.and_then(|g| g.lookup(zipcode));
            MapPoint {
                zipcode,
                latitude: coords.map(|c| c.0),
                longitude: coords.map(|c| c.1),
                city: cities
                    .iter()
                    .find(|c| c.zipcodes.contains(&zipcode))
                    .map(|c| c.city.clone()),
            }
        })
        .collect()
}
