/// CSV and JSON writers for derived tables.
pub mod export;
