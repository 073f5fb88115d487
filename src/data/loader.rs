//! CSV Data Loader Module
//! Reads the raw air-quality table with Polars and normalizes it into a typed
//! [`Dataset`]: index column pruning, date parsing, numeric measurements.

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::model::{Dataset, GroupKey, Record};
use super::processor::DataProcessor;
use crate::config::LoadConfig;

#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("Required column '{0}' missing from input")]
    MissingColumn(String),
}

/// Date layouts accepted for the date column, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%Y%m%d",
];

/// Timestamp layouts whose date part is kept.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse a raw date cell. Unrecognized text yields `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
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

/// Load a CSV file into a [`Dataset`].
pub fn load(path: impl AsRef<Path>, config: &LoadConfig) -> Result<Dataset, DataLoadError> {
    DataLoader::new(config.clone()).load_csv(path.as_ref())
}

/// Handles CSV file loading with Polars.
pub struct DataLoader {
    config: LoadConfig,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new(LoadConfig::default())
    }
}

impl DataLoader {
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    /// Read the raw frame.
    pub fn read_frame(&self, path: &Path) -> Result<DataFrame, DataLoadError> {
        if !path.is_file() {
            return Err(DataLoadError::NotFound(path.to_path_buf()));
        }

        // Use lazy evaluation for memory efficiency, then collect
        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_infer_schema_length(Some(10000))
            .with_ignore_errors(true)
            .finish()?
            .collect()?;

        Ok(df)
    }

    /// Load and normalize a CSV file.
    pub fn load_csv(&self, path: &Path) -> Result<Dataset, DataLoadError> {
        let df = self.read_frame(path)?;
        info!(
            "Loaded {} rows x {} columns from {}",
            df.height(),
            df.width(),
            path.display()
        );
        self.normalize(&df)
    }

    /// Names of numeric columns in the frame.
    fn get_numeric_columns(df: &DataFrame) -> Vec<String> {
        df.get_columns()
            .iter()
            .filter(|col| {
                matches!(
                    col.dtype(),
                    DataType::Float32
                        | DataType::Float64
                        | DataType::Int8
                        | DataType::Int16
                        | DataType::Int32
                        | DataType::Int64
                        | DataType::UInt8
                        | DataType::UInt16
                        | DataType::UInt32
                        | DataType::UInt64
                )
            })
            .map(|col| col.name().to_string())
            .collect()
    }

    fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, DataLoadError> {
        let as_str = df.column(name)?.cast(&DataType::String)?;
        let values = as_str
            .str()?
            .into_iter()
            .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
            .collect();
        Ok(values)
    }

    fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataLoadError> {
        let as_f64 = df.column(name)?.cast(&DataType::Float64)?;
        let values = as_f64
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        Ok(values)
    }

    /// Turn a raw frame into a [`Dataset`].
    pub fn normalize(&self, df: &DataFrame) -> Result<Dataset, DataLoadError> {
        let fields = &self.config.fields;
        let all_columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let (dropped, columns): (Vec<String>, Vec<String>) = all_columns
            .into_iter()
            .partition(|name| self.config.index_columns.contains(name));
        for name in &dropped {
            info!("Dropped index column '{name}'");
        }

        if !columns.contains(&fields.date) {
            return Err(DataLoadError::MissingColumn(fields.date.clone()));
        }

        let numeric = Self::get_numeric_columns(df);
        let mut measurement_names = Vec::new();
        let mut attribute_names = Vec::new();
        for name in &columns {
            if fields.is_keyed(name) {
                continue;
            }
            if numeric.contains(name) || self.config.measurement_hints.contains(name) {
                measurement_names.push(name.clone());
            } else {
                attribute_names.push(name.clone());
            }
        }
        debug!(
            "{} measurement columns, {} text attributes",
            measurement_names.len(),
            attribute_names.len()
        );

        let raw_dates = Self::string_values(df, &fields.date)?;

        let mut keyed: BTreeMap<GroupKey, Vec<Option<String>>> = BTreeMap::new();
        for key in GroupKey::ALL {
            let name = fields.for_key(key);
            if columns.iter().any(|c| c == name) {
                keyed.insert(key, Self::string_values(df, name)?);
            } else {
                warn!("Column '{name}' not found; {key} will be null for every row");
            }
        }

        let measurement_values = measurement_names
            .iter()
            .map(|name| Ok((name.clone(), Self::float_values(df, name)?)))
            .collect::<Result<Vec<_>, DataLoadError>>()?;
        let attribute_values = attribute_names
            .iter()
            .map(|name| Ok((name.clone(), Self::string_values(df, name)?)))
            .collect::<Result<Vec<_>, DataLoadError>>()?;

        let mut dataset = Dataset::new(measurement_names);
        dataset.attribute_names = attribute_names;
        dataset.field_names = fields.clone();
        dataset.present_fields = keyed.keys().copied().collect();
        dataset.column_order = columns;

        let mut unparseable = 0usize;
        for (row, raw_date) in raw_dates.iter().enumerate() {
            let date = raw_date.as_deref().and_then(parse_date);
            if date.is_none() {
                unparseable += 1;
                if self.config.drop_unparseable_dates {
                    continue;
                }
            }

            let mut record = Record::new(row);
            record.date = date;
            record.state = keyed.get(&GroupKey::State).and_then(|v| v[row].clone());
            record.county = keyed.get(&GroupKey::County).and_then(|v| v[row].clone());
            record.city = keyed.get(&GroupKey::City).and_then(|v| v[row].clone());
            for (name, values) in &measurement_values {
                record.measurements.insert(name.clone(), values[row]);
            }
            for (name, values) in &attribute_values {
                record.attributes.insert(name.clone(), values[row].clone());
            }
            dataset.push(record);
        }

        if unparseable > 0 {
            if self.config.drop_unparseable_dates {
                warn!("Dropped {unparseable} rows with unparseable dates");
            } else {
                warn!("Kept {unparseable} rows with unparseable dates as null");
            }
        }

        if self.config.drop_duplicate_rows {
            let before = dataset.len();
            dataset = DataProcessor::drop_duplicates(dataset);
            info!("Removed {} duplicate rows", before - dataset.len());
        }

        Ok(dataset)
    }
}
