//! Data Processor Module
//! Row-level slicing and deduplication over a loaded [`Dataset`].

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::model::{Dataset, GroupKey, Record};

/// Hashable view of a record's content, row identity excluded.
type RecordContent = (
    Option<NaiveDate>,
    Option<String>,
    Option<String>,
    Option<String>,
    Vec<Option<u64>>,
    Vec<Option<String>>,
);

fn content_of(record: &Record) -> RecordContent {
    (
        record.date,
        record.state.clone(),
        record.county.clone(),
        record.city.clone(),
        record.measurements.values().map(|v| v.map(f64::to_bits)).collect(),
        record.attributes.values().cloned().collect(),
    )
}

/// Handles filtering and deduplication operations.
pub struct DataProcessor;

impl DataProcessor {
    /// Remove exact duplicate rows, keeping the first occurrence.
    pub fn drop_duplicates(dataset: Dataset) -> Dataset {
        let mut seen: HashSet<RecordContent> = HashSet::with_capacity(dataset.len());
        let records = dataset
            .records
            .iter()
            .filter(|r| seen.insert(content_of(r)))
            .cloned()
            .collect();
        dataset.with_records(records)
    }

    /// Rows with a date inside `[start, end]`. Rows without a date are excluded.
    pub fn filter_by_date_range(dataset: &Dataset, start: NaiveDate, end: NaiveDate) -> Dataset {
        let records = dataset
            .records
            .iter()
            .filter(|r| r.date.is_some_and(|d| d >= start && d <= end))
            .cloned()
            .collect();
        dataset.with_records(records)
    }

    /// Rows whose `key` field equals `value`. An unknown value gives an empty dataset.
    pub fn filter_by_field(dataset: &Dataset, key: GroupKey, value: &str) -> Dataset {
        let records = dataset
            .records
            .iter()
            .filter(|r| r.field(key) == Some(value))
            .cloned()
            .collect();
        dataset.with_records(records)
    }

    /// Sorted distinct non-null values of a keyed field.
    pub fn unique_values(dataset: &Dataset, key: GroupKey) -> Vec<String> {
        dataset
            .records
            .iter()
            .filter_map(|r| r.field(key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Earliest and latest date present.
    pub fn date_span(dataset: &Dataset) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = dataset.records.iter().filter_map(|r| r.date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }

    /// Null count per column: measurements, keyed fields and the date.
    pub fn missing_counts(dataset: &Dataset) -> BTreeMap<String, usize> {
        let mut counts = dataset.null_counts();
        let names = &dataset.field_names;
        counts.insert(
            names.date.clone(),
            dataset.records.iter().filter(|r| r.date.is_none()).count(),
        );
        for key in GroupKey::ALL {
            if dataset.has_field(key) {
                let nulls = dataset.records.iter().filter(|r| r.field(key).is_none()).count();
                counts.insert(names.for_key(key).to_string(), nulls);
            }
        }
        counts
    }
}
