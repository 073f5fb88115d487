//! Stage A: grouped median imputation.
//!
//! Rows are partitioned by the group key into position lists, each group's
//! median is computed from its non-null values, and the median is written back
//! into that group's null cells by stored position.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{dedup_targets, validate_group_key, validate_measurements, SchemaError};
use crate::data::{Dataset, GroupKey};
use crate::stats::StatsCalculator;

/// What to do with a group whose values are all null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllNullPolicy {
    /// Keep the cells null and report them.
    #[default]
    LeaveNull,
    /// Fill from the median of the whole column.
    GlobalMedian,
}

/// A group with no non-null values for a target column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllNullGroupWarning {
    pub column: String,
    pub group: String,
    /// Number of cells in the group.
    pub rows: usize,
    /// Value used under [`AllNullPolicy::GlobalMedian`], if any.
    pub filled_with: Option<f64>,
}

/// Per-column outcome of Stage A.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnImputation {
    pub filled: usize,
    /// Cells still null after the stage (all-null groups, null group keys).
    pub unresolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImputationReport {
    pub group_key: Option<GroupKey>,
    pub columns: BTreeMap<String, ColumnImputation>,
    pub warnings: Vec<AllNullGroupWarning>,
}

impl ImputationReport {
    pub fn total_filled(&self) -> usize {
        self.columns.values().map(|c| c.filled).sum()
    }

    pub fn total_unresolved(&self) -> usize {
        self.columns.values().map(|c| c.unresolved).sum()
    }
}

/// Fill nulls in `targets` with the median of their `group_key` group,
/// leaving all-null groups null.
pub fn impute(
    dataset: Dataset,
    targets: &[String],
    group_key: GroupKey,
) -> Result<(Dataset, ImputationReport), SchemaError> {
    impute_with(dataset, targets, group_key, AllNullPolicy::LeaveNull)
}

/// [`impute`] with an explicit all-null group policy.
pub fn impute_with(
    dataset: Dataset,
    targets: &[String],
    group_key: GroupKey,
    policy: AllNullPolicy,
) -> Result<(Dataset, ImputationReport), SchemaError> {
    validate_measurements(&dataset, targets)?;
    validate_group_key(&dataset, group_key)?;
    Ok(impute_validated(dataset, targets, group_key, policy))
}

pub(crate) fn impute_validated(
    mut dataset: Dataset,
    targets: &[String],
    group_key: GroupKey,
    policy: AllNullPolicy,
) -> (Dataset, ImputationReport) {
    let groups = dataset.partition(group_key);
    let mut report = ImputationReport {
        group_key: Some(group_key),
        ..Default::default()
    };

    for column in dedup_targets(targets) {
        let global_median = match policy {
            AllNullPolicy::LeaveNull => None,
            AllNullPolicy::GlobalMedian => {
                StatsCalculator::median(&dataset.non_null_values(column))
            }
        };
        let mut outcome = ColumnImputation::default();

        for (group, positions) in &groups {
            let (present, missing): (Vec<usize>, Vec<usize>) = positions
                .iter()
                .copied()
                .partition(|&pos| dataset.records[pos].value(column).is_some());
            if missing.is_empty() {
                continue;
            }

            let values: Vec<f64> = present
                .iter()
                .filter_map(|&pos| dataset.records[pos].value(column))
                .collect();

            let fill = match StatsCalculator::median(&values) {
                Some(median) => Some(median),
                None => {
                    warn!(
                        "'{column}': all {} values null for {group_key} '{group}'",
                        missing.len()
                    );
                    report.warnings.push(AllNullGroupWarning {
                        column: column.to_string(),
                        group: group.clone(),
                        rows: missing.len(),
                        filled_with: global_median,
                    });
                    global_median
                }
            };

            if let Some(value) = fill {
                for pos in &missing {
                    dataset.records[*pos].set_value(column, Some(value));
                }
                outcome.filled += missing.len();
            }
        }

        outcome.unresolved = dataset
            .records
            .iter()
            .filter(|r| r.value(column).is_none())
            .count();
        debug!(
            "'{column}': filled {} cells, {} unresolved",
            outcome.filled, outcome.unresolved
        );
        report.columns.insert(column.to_string(), outcome);
    }

    (dataset, report)
}
