//! Stage B: IQR outlier detection with median replacement.
//!
//! Each target column is planned independently from a private copy of its
//! values (fences, replacement median, hit list) on the rayon pool, then the
//! plans are written back sequentially. Since no plan reads another column,
//! processing order never affects the result.

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{dedup_targets, validate_group_key, validate_measurements, SchemaError};
use crate::data::{Dataset, GroupKey};
use crate::stats::{OutlierBounds, StatsCalculator};

/// Which rows share one set of fences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierScope {
    /// One set of fences per column over the whole dataset.
    #[default]
    Dataset,
    /// One set of fences per group of the key; rows with a null key are skipped.
    Group(GroupKey),
}

/// Fences and replacement value of one scope unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeBounds {
    /// Group label, `None` for dataset scope.
    pub group: Option<String>,
    pub bounds: OutlierBounds,
    /// Median of the unit's values before any replacement.
    pub median: f64,
}

/// One replaced cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierHit {
    /// Source row identity of the record.
    pub row: usize,
    pub original: f64,
    pub replacement: f64,
}

/// Audit trail for one target column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutliers {
    pub column: String,
    pub bounds: Vec<ScopeBounds>,
    pub hits: Vec<OutlierHit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutlierReport {
    pub scope: OutlierScope,
    /// In target order.
    pub columns: Vec<ColumnOutliers>,
}

impl OutlierReport {
    pub fn column(&self, name: &str) -> Option<&ColumnOutliers> {
        self.columns.iter().find(|c| c.column == name)
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(|c| c.hits.len()).sum()
    }
}

/// Replace IQR outliers in `targets` with the column median, fences computed
/// over the whole dataset.
pub fn remove_outliers(
    dataset: Dataset,
    targets: &[String],
) -> Result<(Dataset, OutlierReport), SchemaError> {
    remove_outliers_scoped(dataset, targets, OutlierScope::Dataset)
}

/// [`remove_outliers`] with fences computed per scope unit.
pub fn remove_outliers_scoped(
    dataset: Dataset,
    targets: &[String],
    scope: OutlierScope,
) -> Result<(Dataset, OutlierReport), SchemaError> {
    validate_measurements(&dataset, targets)?;
    if let OutlierScope::Group(key) = scope {
        validate_group_key(&dataset, key)?;
    }
    Ok(remove_outliers_validated(dataset, targets, scope))
}

/// A scope unit: optional group label and the record positions it covers.
type Unit = (Option<String>, Vec<usize>);

/// Replacement plan for one column: the report entry plus (position, value) writes.
struct ColumnPlan {
    outliers: ColumnOutliers,
    writes: Vec<(usize, f64)>,
}

pub(crate) fn remove_outliers_validated(
    mut dataset: Dataset,
    targets: &[String],
    scope: OutlierScope,
) -> (Dataset, OutlierReport) {
    let units: Vec<Unit> = match scope {
        OutlierScope::Dataset => vec![(None, (0..dataset.len()).collect())],
        OutlierScope::Group(key) => dataset
            .partition(key)
            .into_iter()
            .map(|(group, positions)| (Some(group), positions))
            .collect(),
    };
    let rows: Vec<usize> = dataset.records.iter().map(|r| r.row).collect();

    // each worker owns its column copy; the dataset is only read here
    let columns: Vec<(String, Vec<Option<f64>>)> = dedup_targets(targets)
        .into_iter()
        .map(|name| (name.to_string(), dataset.column_values(name)))
        .collect();

    let plans: Vec<ColumnPlan> = columns
        .into_par_iter()
        .map(|(column, values)| plan_column(column, &values, &units, &rows))
        .collect();

    let mut report = OutlierReport {
        scope,
        columns: Vec::with_capacity(plans.len()),
    };
    for plan in plans {
        let column = &plan.outliers.column;
        for (pos, value) in &plan.writes {
            dataset.records[*pos].set_value(column, Some(*value));
        }
        if plan.writes.is_empty() {
            debug!("'{column}': no outliers");
        } else {
            info!("'{column}': replaced {} outliers", plan.writes.len());
        }
        report.columns.push(plan.outliers);
    }

    (dataset, report)
}

fn plan_column(
    column: String,
    values: &[Option<f64>],
    units: &[Unit],
    rows: &[usize],
) -> ColumnPlan {
    let mut bounds = Vec::new();
    let mut hits = Vec::new();
    let mut writes = Vec::new();

    for (group, positions) in units {
        let present: Vec<(usize, f64)> = positions
            .iter()
            .filter_map(|&pos| values[pos].map(|v| (pos, v)))
            .collect();
        let unit_values: Vec<f64> = present.iter().map(|(_, v)| *v).collect();

        let Some(fences) = OutlierBounds::from_values(&unit_values) else {
            continue;
        };
        // fixed before any replacement so the fences cannot drift
        let Some(median) = StatsCalculator::median(&unit_values) else {
            continue;
        };

        for (pos, value) in present {
            if fences.is_outlier(value) {
                hits.push(OutlierHit {
                    row: rows[pos],
                    original: value,
                    replacement: median,
                });
                writes.push((pos, median));
            }
        }
        bounds.push(ScopeBounds {
            group: group.clone(),
            bounds: fences,
            median,
        });
    }

    ColumnPlan {
        outliers: ColumnOutliers {
            column,
            bounds,
            hits,
        },
        writes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;

    fn dataset(columns: &[(&str, &[Option<f64>])]) -> Dataset {
        let names: Vec<String> = columns.iter().map(|(n, _)| n.to_string()).collect();
        let mut ds = Dataset::new(names);
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        for i in 0..len {
            let mut record = Record::new(i);
            for (name, values) in columns {
                record = record.with_value(name, values[i]);
            }
            ds.push(record);
        }
        ds
    }

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn replaces_extreme_value_with_original_median() {
        let col = some(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let ds = dataset(&[("NO2 AQI", &col[..])]);

        let (out, report) = remove_outliers(ds, &["NO2 AQI".to_string()]).unwrap();
        assert_eq!(out.column_values("NO2 AQI"), some(&[1.0, 2.0, 3.0, 4.0, 3.0]));

        let entry = report.column("NO2 AQI").unwrap();
        assert_eq!(entry.bounds.len(), 1);
        assert_eq!(entry.bounds[0].bounds.lower, -1.0);
        assert_eq!(entry.bounds[0].bounds.upper, 7.0);
        assert_eq!(
            entry.hits,
            vec![OutlierHit {
                row: 4,
                original: 100.0,
                replacement: 3.0
            }]
        );
    }

    #[test]
    fn every_outlier_gets_the_pre_replacement_median() {
        let col = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 100.0, 200.0]);
        let ds = dataset(&[("SO2 AQI", &col[..])]);

        let (out, report) = remove_outliers(ds, &["SO2 AQI".to_string()]).unwrap();
        // median of the untouched column; refreshing it after the first write would give 5.25
        let entry = report.column("SO2 AQI").unwrap();
        assert_eq!(entry.bounds[0].median, 5.5);
        assert_eq!(entry.hits.len(), 2);
        assert!(entry.hits.iter().all(|h| h.replacement == 5.5));

        let values = out.column_values("SO2 AQI");
        assert_eq!(values[8], Some(5.5));
        assert_eq!(values[9], Some(5.5));
    }

    #[test]
    fn second_pass_finds_nothing() {
        let col = some(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let ds = dataset(&[("NO2 AQI", &col[..])]);
        let targets = vec!["NO2 AQI".to_string()];

        let (once, first) = remove_outliers(ds, &targets).unwrap();
        let (twice, second) = remove_outliers(once.clone(), &targets).unwrap();
        assert_eq!(first.total(), 1);
        assert_eq!(second.total(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn target_order_does_not_change_results() {
        let a = some(&[1.0, 2.0, 3.0, 4.0, 100.0, 2.5]);
        let b = some(&[-50.0, 10.0, 11.0, 12.0, 13.0, 11.5]);
        let c = vec![Some(5.0), None, Some(6.0), Some(7.0), Some(6.5), Some(90.0)];
        let ds = dataset(&[("a", &a[..]), ("b", &b[..]), ("c", &c[..])]);

        let forward: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let backward: Vec<String> = vec!["c".into(), "a".into(), "b".into()];
        let (x, _) = remove_outliers(ds.clone(), &forward).unwrap();
        let (y, _) = remove_outliers(ds, &backward).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn nulls_are_ignored_and_preserved() {
        let col = vec![None, Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(100.0), None];
        let ds = dataset(&[("CO AQI", &col[..])]);

        let (out, report) = remove_outliers(ds, &["CO AQI".to_string()]).unwrap();
        let values = out.column_values("CO AQI");
        assert_eq!(values[0], None);
        assert_eq!(values[6], None);
        assert_eq!(values[5], Some(3.0));
        assert_eq!(report.total(), 1);
    }

    #[test]
    fn all_null_and_single_row_columns_are_untouched() {
        let empty: Vec<Option<f64>> = vec![None, None];
        let one = vec![Some(42.0), None];
        let ds = dataset(&[("a", &empty[..]), ("b", &one[..])]);

        let (out, report) = remove_outliers(ds.clone(), &["a".into(), "b".into()]).unwrap();
        assert_eq!(out, ds);
        assert_eq!(report.total(), 0);
        assert!(report.column("a").unwrap().bounds.is_empty());
    }

    #[test]
    fn group_scope_uses_group_fences_and_medians() {
        let mut ds = Dataset::new(vec!["v".into()]);
        let rows = [
            ("X", 1.0),
            ("X", 2.0),
            ("X", 3.0),
            ("X", 4.0),
            ("X", 100.0),
            ("Y", 100.0),
            ("Y", 101.0),
            ("Y", 102.0),
        ];
        for (i, (city, v)) in rows.into_iter().enumerate() {
            ds.push(Record::new(i).with_field(GroupKey::City, city).with_value("v", Some(v)));
        }

        let (out, report) =
            remove_outliers_scoped(ds, &["v".into()], OutlierScope::Group(GroupKey::City)).unwrap();
        assert_eq!(out.records[4].value("v"), Some(3.0));
        // 100 is ordinary within Y
        assert_eq!(out.records[5].value("v"), Some(100.0));
        assert_eq!(report.total(), 1);
        assert_eq!(report.column("v").unwrap().bounds.len(), 2);
    }

    #[test]
    fn hits_report_source_row_identity() {
        let col = some(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let mut ds = dataset(&[("v", &col[..])]);
        for record in &mut ds.records {
            record.row += 10;
        }

        let (_, report) = remove_outliers(ds, &["v".into()]).unwrap();
        assert_eq!(report.column("v").unwrap().hits[0].row, 14);
    }

    #[test]
    fn unknown_target_fails_before_mutation() {
        let col = some(&[1.0, 100.0]);
        let ds = dataset(&[("v", &col[..])]);
        let err = remove_outliers(ds, &["v".into(), "w".into()]).unwrap_err();
        assert_eq!(err, SchemaError::MissingMeasurement { column: "w".into() });
    }

    #[test]
    fn empty_dataset_is_a_no_op() {
        let ds = Dataset::new(vec!["v".into()]);
        let (out, report) = remove_outliers(ds, &["v".into()]).unwrap();
        assert!(out.is_empty());
        assert_eq!(report.total(), 0);
    }
}
