//! aqclean - air-quality CSV cleaning pipeline
//!
//! Loads a pollutant table (date, state, county, city and NO2/O3/SO2/CO
//! readings), fills missing AQI values with per-city medians, replaces IQR
//! outliers with column medians, and answers the grouped/temporal summary
//! queries a dashboard runs over the cleaned table.
//!
//! ```rust,ignore
//! use aqclean::{load, CleaningConfig, CleaningPipeline};
//!
//! let config = CleaningConfig::default();
//! let dataset = load("pollution_us_2000_2016.csv", &config.load_config())?;
//! let (cleaned, report) = CleaningPipeline::run(dataset, &config)?;
//! println!("{} outliers replaced", report.outliers.total());
//! ```

pub mod cleaning;
pub mod config;
pub mod data;
pub mod stats;

pub use cleaning::{
    impute, remove_outliers, CleaningPipeline, CleaningReport, ImputationReport, OutlierReport,
    SchemaError,
};
pub use config::{CleaningConfig, ConfigError, LoadConfig};
pub use data::{load, DataLoadError, Dataset, GroupKey, Record};
