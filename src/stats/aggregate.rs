//! Grouped aggregates for the dashboard views: regional and temporal
//! rollups, rankings and high-pollution day detection.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::calculator::{CorrelationMatrix, StatsCalculator};
use crate::data::{Dataset, GroupKey, Record};

/// Meteorological season of a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Fall,
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::from_month(date.month())
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Row partitioning for an aggregate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    State,
    County,
    City,
    /// (state, county) pairs.
    StateCounty,
    Date,
    /// Calendar month `01`..`12`, all years pooled.
    Month,
    /// (state, season) pairs.
    StateSeason,
}

impl GroupBy {
    /// Group label of a record; `None` when any component is null.
    fn label(&self, record: &Record) -> Option<Vec<String>> {
        let field = |key: GroupKey| record.field(key).map(str::to_string);
        match self {
            GroupBy::State => Some(vec![field(GroupKey::State)?]),
            GroupBy::County => Some(vec![field(GroupKey::County)?]),
            GroupBy::City => Some(vec![field(GroupKey::City)?]),
            GroupBy::StateCounty => Some(vec![field(GroupKey::State)?, field(GroupKey::County)?]),
            GroupBy::Date => Some(vec![record.date?.format("%Y-%m-%d").to_string()]),
            GroupBy::Month => Some(vec![format!("{:02}", record.date?.month())]),
            GroupBy::StateSeason => Some(vec![
                field(GroupKey::State)?,
                Season::of(record.date?).to_string(),
            ]),
        }
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "state" => Ok(GroupBy::State),
            "county" => Ok(GroupBy::County),
            "city" => Ok(GroupBy::City),
            "state_county" => Ok(GroupBy::StateCounty),
            "date" => Ok(GroupBy::Date),
            "month" => Ok(GroupBy::Month),
            "state_season" => Ok(GroupBy::StateSeason),
            other => Err(format!("unknown grouping '{other}'")),
        }
    }
}

/// Reduction applied within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Median,
    Max,
    Min,
    Count,
}

impl Aggregation {
    /// Reduce non-null values. Every reduction but `Count` is undefined on empty input.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return matches!(self, Aggregation::Count).then_some(0.0);
        }
        match self {
            Aggregation::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregation::Median => StatsCalculator::median(values),
            Aggregation::Max => values.iter().copied().reduce(f64::max),
            Aggregation::Min => values.iter().copied().reduce(f64::min),
            Aggregation::Count => Some(values.len() as f64),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "max" => Ok(Aggregation::Max),
            "min" => Ok(Aggregation::Min),
            "count" => Ok(Aggregation::Count),
            other => Err(format!("unknown aggregation '{other}'")),
        }
    }
}

/// One group of an aggregate table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub group: Vec<String>,
    pub values: BTreeMap<String, Option<f64>>,
}

/// Result of a grouped aggregation, rows sorted by group label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub group_by: GroupBy,
    pub aggregation: Aggregation,
    pub columns: Vec<String>,
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn row(&self, group: &[&str]) -> Option<&AggregateRow> {
        self.rows
            .iter()
            .find(|r| r.group.iter().map(String::as_str).eq(group.iter().copied()))
    }

    /// Rows ranked by `columns`, highest first, truncated to `n`.
    ///
    /// Later columns break ties left by earlier ones. Within a column, groups
    /// with an undefined value sort last.
    pub fn top_n<S: AsRef<str>>(&self, columns: &[S], n: usize) -> AggregateTable {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            columns
                .iter()
                .map(|c| {
                    let va = a.values.get(c.as_ref()).copied().flatten();
                    let vb = b.values.get(c.as_ref()).copied().flatten();
                    match (va, vb) {
                        (Some(x), Some(y)) => y.total_cmp(&x),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    }
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        rows.truncate(n);

        AggregateTable {
            group_by: self.group_by,
            aggregation: self.aggregation,
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Pearson correlation between the table's columns, one observation per group.
    pub fn correlation(&self) -> CorrelationMatrix {
        let series: Vec<Vec<Option<f64>>> = self
            .columns
            .iter()
            .map(|c| {
                self.rows
                    .iter()
                    .map(|r| r.values.get(c).copied().flatten())
                    .collect()
            })
            .collect();
        StatsCalculator::correlate_series(self.columns.clone(), &series)
    }
}

/// A (date, state) whose daily maximum exceeds the column's threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighPollutionDay {
    pub date: NaiveDate,
    pub state: String,
    pub column: String,
    pub value: f64,
    pub threshold: f64,
}

/// Grouped queries over a dataset.
pub struct Aggregator;

impl Aggregator {
    /// Aggregate measurement columns per group. Unknown columns are skipped;
    /// an empty dataset yields an empty table.
    pub fn group_aggregate(
        dataset: &Dataset,
        group_by: GroupBy,
        columns: &[String],
        aggregation: Aggregation,
    ) -> AggregateTable {
        let columns: Vec<String> = columns
            .iter()
            .filter(|c| dataset.has_measurement(c))
            .cloned()
            .collect();

        let mut groups: BTreeMap<Vec<String>, Vec<&Record>> = BTreeMap::new();
        for record in &dataset.records {
            if let Some(label) = group_by.label(record) {
                groups.entry(label).or_default().push(record);
            }
        }

        let rows = groups
            .into_iter()
            .map(|(group, records)| {
                let values = columns
                    .iter()
                    .map(|c| {
                        let present: Vec<f64> = records.iter().filter_map(|r| r.value(c)).collect();
                        (c.clone(), aggregation.apply(&present))
                    })
                    .collect();
                AggregateRow { group, values }
            })
            .collect();

        AggregateTable {
            group_by,
            aggregation,
            columns,
            rows,
        }
    }

    /// Single country-level row over the whole dataset.
    pub fn overall(
        dataset: &Dataset,
        columns: &[String],
        aggregation: Aggregation,
    ) -> BTreeMap<String, Option<f64>> {
        columns
            .iter()
            .filter(|c| dataset.has_measurement(c))
            .map(|c| (c.clone(), aggregation.apply(&dataset.non_null_values(c))))
            .collect()
    }

    /// Daily per-state maxima above the `quantile` of all daily maxima.
    ///
    /// Sorted by column, then date, then state.
    pub fn high_pollution_days(
        dataset: &Dataset,
        columns: &[String],
        quantile: f64,
    ) -> Vec<HighPollutionDay> {
        let mut by_day_state: BTreeMap<(NaiveDate, String), Vec<&Record>> = BTreeMap::new();
        for record in &dataset.records {
            if let (Some(date), Some(state)) = (record.date, record.field(GroupKey::State)) {
                by_day_state
                    .entry((date, state.to_string()))
                    .or_default()
                    .push(record);
            }
        }

        let mut hits = Vec::new();
        for column in columns.iter().filter(|c| dataset.has_measurement(c)) {
            let maxima: Vec<((NaiveDate, String), f64)> = by_day_state
                .iter()
                .filter_map(|(key, records)| {
                    let present: Vec<f64> =
                        records.iter().filter_map(|r| r.value(column)).collect();
                    Some((key.clone(), Aggregation::Max.apply(&present)?))
                })
                .collect();
            let values: Vec<f64> = maxima.iter().map(|(_, v)| *v).collect();
            let Some(threshold) = StatsCalculator::quantile(&values, quantile) else {
                continue;
            };

            hits.extend(
                maxima
                    .into_iter()
                    .filter(|(_, v)| *v > threshold)
                    .map(|((date, state), value)| HighPollutionDay {
                        date,
                        state,
                        column: column.clone(),
                        value,
                        threshold,
                    }),
            );
        }
        hits
    }
}
