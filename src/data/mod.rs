//! Data module - CSV loading, normalization, slicing and export

pub mod export;
mod loader;
mod model;
mod processor;

pub use loader::{load, parse_date, DataLoadError, DataLoader};
pub use model::{Dataset, FieldNames, GroupKey, Record};
pub use processor::DataProcessor;
