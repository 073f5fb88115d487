//! Writes a [`Dataset`] back to CSV in its source column order.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use super::model::{Dataset, GroupKey};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// Build a Polars frame from the dataset, one column per source column.
pub fn to_dataframe(dataset: &Dataset) -> Result<DataFrame, ExportError> {
    let names = &dataset.field_names;
    let mut columns: Vec<Column> = Vec::with_capacity(dataset.column_order.len());

    for name in &dataset.column_order {
        let column = if *name == names.date {
            let dates: Vec<Option<String>> = dataset
                .records
                .iter()
                .map(|r| r.date.map(|d| d.format("%Y-%m-%d").to_string()))
                .collect();
            Column::new(name.as_str().into(), dates)
        } else if let Some(key) = GroupKey::ALL
            .into_iter()
            .find(|k| names.for_key(*k) == name && dataset.has_field(*k))
        {
            let values: Vec<Option<&str>> = dataset.records.iter().map(|r| r.field(key)).collect();
            Column::new(name.as_str().into(), values)
        } else if dataset.has_measurement(name) {
            Column::new(name.as_str().into(), dataset.column_values(name))
        } else if dataset.attribute_names.contains(name) {
            let values: Vec<Option<&str>> = dataset
                .records
                .iter()
                .map(|r| r.attributes.get(name).and_then(|v| v.as_deref()))
                .collect();
            Column::new(name.as_str().into(), values)
        } else {
            continue;
        };
        columns.push(column);
    }

    Ok(DataFrame::new(columns)?)
}

/// Write the dataset as comma-separated text with a header row.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<(), ExportError> {
    let mut df = to_dataframe(dataset)?;
    let mut file = File::create(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;
    use chrono::NaiveDate;

    #[test]
    fn frame_follows_column_order() {
        let mut ds = Dataset::new(vec!["CO AQI".into()]);
        ds.present_fields.remove(&GroupKey::County);
        ds.push(
            Record::new(0)
                .with_date(NaiveDate::from_ymd_opt(2001, 2, 3).unwrap())
                .with_field(GroupKey::City, "Tucson")
                .with_value("CO AQI", Some(4.0)),
        );
        ds.push(Record::new(1).with_value("CO AQI", None));

        let df = to_dataframe(&ds).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["Date Local", "State", "City", "CO AQI"]);
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("CO AQI").unwrap().null_count(), 1);
    }
}
