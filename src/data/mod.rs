//! Dataset loading and cleaning.

/// Row validation, normalization and cumulative capacity.
pub mod clean;
pub mod fuel;
/// Delimited-file reader with type coercion.
pub mod loader;
pub mod record;

pub use clean::{CleanReport, CleanedDataset, clean};
pub use loader::{LoadedDataset, load_path, load_reader};
pub use record::{CleanedRecord, FacilityId, FacilityRecord, FuelType, RawFacility};
