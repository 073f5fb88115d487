//! Cleaning pipeline - grouped imputation followed by outlier correction
//!
//! ```text
//!   Dataset ──[imputer]──▶ imputed ──[outliers, per column]──▶ cleaned
//! ```
//!
//! Both stages are total over any well-formed dataset. The only failure is a
//! [`SchemaError`], raised before anything is mutated.

mod imputer;
mod outliers;

pub use imputer::{
    impute, impute_with, AllNullGroupWarning, AllNullPolicy, ColumnImputation, ImputationReport,
};
pub use outliers::{
    remove_outliers, remove_outliers_scoped, ColumnOutliers, OutlierHit, OutlierReport,
    OutlierScope, ScopeBounds,
};

use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::config::CleaningConfig;
use crate::data::{Dataset, GroupKey};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Measurement column '{column}' not found in dataset")]
    MissingMeasurement { column: String },
    #[error("Group key '{key}' not present in dataset")]
    MissingGroupKey { key: GroupKey },
}

pub(crate) fn validate_measurements(
    dataset: &Dataset,
    targets: &[String],
) -> Result<(), SchemaError> {
    match targets.iter().find(|t| !dataset.has_measurement(t)) {
        Some(column) => Err(SchemaError::MissingMeasurement {
            column: column.clone(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn validate_group_key(dataset: &Dataset, key: GroupKey) -> Result<(), SchemaError> {
    if dataset.has_field(key) {
        Ok(())
    } else {
        Err(SchemaError::MissingGroupKey { key })
    }
}

/// Targets in first-seen order with repeats removed.
pub(crate) fn dedup_targets(targets: &[String]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::with_capacity(targets.len());
    for t in targets {
        if !seen.contains(&t.as_str()) {
            seen.push(t);
        }
    }
    seen
}

/// What a full cleaning run changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows: usize,
    pub imputation: ImputationReport,
    pub outliers: OutlierReport,
}

/// Runs Stage A then Stage B with the settings of a [`CleaningConfig`].
pub struct CleaningPipeline;

impl CleaningPipeline {
    /// Check every configured column and key against the dataset.
    pub fn validate(dataset: &Dataset, config: &CleaningConfig) -> Result<(), SchemaError> {
        validate_measurements(dataset, &config.impute.targets)?;
        validate_group_key(dataset, config.impute.group_key)?;
        validate_measurements(dataset, &config.outliers.targets)?;
        if let OutlierScope::Group(key) = config.outliers.scope {
            validate_group_key(dataset, key)?;
        }
        Ok(())
    }

    pub fn run(
        dataset: Dataset,
        config: &CleaningConfig,
    ) -> Result<(Dataset, CleaningReport), SchemaError> {
        Self::validate(&dataset, config)?;

        let (imputed, imputation) = imputer::impute_validated(
            dataset,
            &config.impute.targets,
            config.impute.group_key,
            config.impute.all_null_policy,
        );
        info!(
            "Imputation: {} cells filled, {} unresolved, {} all-null groups",
            imputation.total_filled(),
            imputation.total_unresolved(),
            imputation.warnings.len()
        );

        let (cleaned, outliers) = outliers::remove_outliers_validated(
            imputed,
            &config.outliers.targets,
            config.outliers.scope,
        );
        info!("Outliers: {} cells replaced", outliers.total());

        let report = CleaningReport {
            rows: cleaned.len(),
            imputation,
            outliers,
        };
        Ok((cleaned, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;

    fn config() -> CleaningConfig {
        let mut config = CleaningConfig::default();
        config.impute.targets = vec!["SO2 AQI".into()];
        config.outliers.targets = vec!["SO2 AQI".into(), "NO2 AQI".into()];
        config
    }

    fn dataset() -> Dataset {
        let mut ds = Dataset::new(vec!["NO2 AQI".into(), "SO2 AQI".into()]);
        let rows = [
            ("X", Some(10.0), None),
            ("X", Some(11.0), Some(1.0)),
            ("X", Some(12.0), Some(2.0)),
            ("X", Some(13.0), Some(3.0)),
            ("Y", Some(200.0), Some(4.0)),
            ("Y", Some(12.5), None),
        ];
        for (i, (city, no2, so2)) in rows.into_iter().enumerate() {
            ds.push(
                Record::new(i)
                    .with_field(GroupKey::City, city)
                    .with_value("NO2 AQI", no2)
                    .with_value("SO2 AQI", so2),
            );
        }
        ds
    }

    #[test]
    fn runs_imputation_then_outliers() {
        let (out, report) = CleaningPipeline::run(dataset(), &config()).unwrap();

        assert_eq!(
            out.column_values("SO2 AQI"),
            vec![Some(2.0), Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(4.0)]
        );
        // NO2 median 12.25; 200 lies above the upper fence 15.3125
        assert_eq!(out.records[4].value("NO2 AQI"), Some(12.25));
        assert_eq!(report.imputation.total_filled(), 2);
        assert_eq!(report.outliers.total(), 1);
        assert_eq!(report.rows, 6);
    }

    #[test]
    fn schema_errors_surface_before_any_stage() {
        let mut cfg = config();
        cfg.outliers.targets.push("PM2.5".into());

        let err = CleaningPipeline::run(dataset(), &cfg).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingMeasurement {
                column: "PM2.5".into()
            }
        );
    }

    #[test]
    fn grouped_outlier_scope_requires_present_key() {
        let mut cfg = config();
        cfg.outliers.scope = OutlierScope::Group(GroupKey::State);
        let mut ds = dataset();
        ds.present_fields.remove(&GroupKey::State);

        assert_eq!(
            CleaningPipeline::validate(&ds, &cfg),
            Err(SchemaError::MissingGroupKey {
                key: GroupKey::State
            })
        );
    }

    #[test]
    fn empty_dataset_passes_through() {
        let ds = dataset().empty_like();
        let (out, report) = CleaningPipeline::run(ds, &config()).unwrap();
        assert!(out.is_empty());
        assert_eq!(report.rows, 0);
        assert_eq!(report.outliers.total(), 0);
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let targets: Vec<String> = vec!["b".into(), "a".into(), "b".into()];
        assert_eq!(dedup_targets(&targets), vec!["b", "a"]);
    }
}
