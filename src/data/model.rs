//! Core row/table types shared by the loader, the cleaning stages and the
//! summary queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Categorical record field that can partition a [`Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    State,
    County,
    City,
}

impl GroupKey {
    pub const ALL: [GroupKey; 3] = [GroupKey::State, GroupKey::County, GroupKey::City];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::State => "state",
            GroupKey::County => "county",
            GroupKey::City => "city",
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Ok(GroupKey::State),
            "county" => Ok(GroupKey::County),
            "city" => Ok(GroupKey::City),
            other => Err(format!("unknown group key '{other}' (expected state, county or city)")),
        }
    }
}

/// Source column names backing the keyed record fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub date: String,
    pub state: String,
    pub county: String,
    pub city: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            date: "Date Local".to_string(),
            state: "State".to_string(),
            county: "County".to_string(),
            city: "City".to_string(),
        }
    }
}

impl FieldNames {
    pub fn for_key(&self, key: GroupKey) -> &str {
        match key {
            GroupKey::State => &self.state,
            GroupKey::County => &self.county,
            GroupKey::City => &self.city,
        }
    }

    /// Whether `name` is one of the keyed columns (date included).
    pub fn is_keyed(&self, name: &str) -> bool {
        name == self.date || name == self.state || name == self.county || name == self.city
    }
}

/// One observation row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Position of the row in the source file (0-based, header excluded).
    /// Survives row dropping so reports can point back at the input.
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub city: Option<String>,
    /// Numeric columns: name → nullable value.
    pub measurements: BTreeMap<String, Option<f64>>,
    /// Remaining text columns (units, address, ...) carried through untouched.
    pub attributes: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_field(mut self, key: GroupKey, value: &str) -> Self {
        *self.field_mut(key) = Some(value.to_string());
        self
    }

    /// Set a measurement; NaN is stored as null.
    pub fn with_value(mut self, name: &str, value: Option<f64>) -> Self {
        self.measurements.insert(name.to_string(), non_nan(value));
        self
    }

    pub fn field(&self, key: GroupKey) -> Option<&str> {
        match key {
            GroupKey::State => self.state.as_deref(),
            GroupKey::County => self.county.as_deref(),
            GroupKey::City => self.city.as_deref(),
        }
    }

    fn field_mut(&mut self, key: GroupKey) -> &mut Option<String> {
        match key {
            GroupKey::State => &mut self.state,
            GroupKey::County => &mut self.county,
            GroupKey::City => &mut self.city,
        }
    }

    /// Measurement value, `None` when null or unknown.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.measurements.get(name).copied().flatten()
    }

    pub fn set_value(&mut self, name: &str, value: Option<f64>) {
        if let Some(slot) = self.measurements.get_mut(name) {
            *slot = non_nan(value);
        }
    }
}

fn non_nan(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Ordered sequence of records sharing one measurement schema.
///
/// Every record carries exactly `measurement_names` (values may be null);
/// [`Dataset::push`] enforces this.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub measurement_names: Vec<String>,
    pub attribute_names: Vec<String>,
    pub field_names: FieldNames,
    /// Keyed fields that existed in the source.
    pub present_fields: BTreeSet<GroupKey>,
    /// Source column order, used when writing the table back out.
    pub column_order: Vec<String>,
}

impl Dataset {
    /// Empty dataset with every keyed field present and default field names.
    pub fn new(measurement_names: Vec<String>) -> Self {
        let field_names = FieldNames::default();
        let mut column_order = vec![
            field_names.date.clone(),
            field_names.state.clone(),
            field_names.county.clone(),
            field_names.city.clone(),
        ];
        column_order.extend(measurement_names.iter().cloned());

        Self {
            records: Vec::new(),
            measurement_names,
            attribute_names: Vec::new(),
            field_names,
            present_fields: GroupKey::ALL.into_iter().collect(),
            column_order,
        }
    }

    /// Same schema, no rows.
    pub fn empty_like(&self) -> Self {
        Self {
            records: Vec::new(),
            measurement_names: self.measurement_names.clone(),
            attribute_names: self.attribute_names.clone(),
            field_names: self.field_names.clone(),
            present_fields: self.present_fields.clone(),
            column_order: self.column_order.clone(),
        }
    }

    /// Same schema, given rows.
    pub fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            records,
            ..self.empty_like()
        }
    }

    /// Append a record, conforming its measurements and attributes to the schema.
    /// NaN measurements become null.
    pub fn push(&mut self, mut record: Record) {
        record
            .measurements
            .retain(|name, _| self.measurement_names.contains(name));
        for value in record.measurements.values_mut() {
            *value = non_nan(*value);
        }
        for name in &self.measurement_names {
            record.measurements.entry(name.clone()).or_insert(None);
        }
        record
            .attributes
            .retain(|name, _| self.attribute_names.contains(name));
        for name in &self.attribute_names {
            record.attributes.entry(name.clone()).or_insert(None);
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_measurement(&self, name: &str) -> bool {
        self.measurement_names.iter().any(|m| m == name)
    }

    pub fn has_field(&self, key: GroupKey) -> bool {
        self.present_fields.contains(&key)
    }

    /// Column values in row order, nulls preserved.
    pub fn column_values(&self, name: &str) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.value(name)).collect()
    }

    /// Non-null column values in row order.
    pub fn non_null_values(&self, name: &str) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.value(name)).collect()
    }

    /// Partition record positions by the value of `key`.
    ///
    /// Records whose key is null belong to no group and are left out.
    pub fn partition(&self, key: GroupKey) -> BTreeMap<String, Vec<usize>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (pos, record) in self.records.iter().enumerate() {
            if let Some(value) = record.field(key) {
                groups.entry(value.to_string()).or_default().push(pos);
            }
        }
        groups
    }

    /// Count of null cells per measurement.
    pub fn null_counts(&self) -> BTreeMap<String, usize> {
        self.measurement_names
            .iter()
            .map(|name| {
                let nulls = self.records.iter().filter(|r| r.value(name).is_none()).count();
                (name.clone(), nulls)
            })
            .collect()
    }
}
