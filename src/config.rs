//! Pipeline Configuration Module
//! Every knob of a cleaning run, loadable from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::cleaning::{AllNullPolicy, OutlierScope};
use crate::data::{FieldNames, GroupKey};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loader settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Index columns left behind by dataframe exports; dropped when present.
    pub index_columns: Vec<String>,
    #[serde(flatten)]
    pub fields: FieldNames,
    /// Columns forced to numeric even when the CSV inference says otherwise
    /// (e.g. a column that is entirely empty in the sample).
    pub measurement_hints: Vec<String>,
    /// Drop rows whose date cannot be parsed instead of keeping a null date.
    pub drop_unparseable_dates: bool,
    /// Remove exact duplicate rows, keeping the first occurrence.
    pub drop_duplicate_rows: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            index_columns: vec!["Unnamed: 0".to_string(), String::new()],
            fields: FieldNames::default(),
            measurement_hints: Vec::new(),
            drop_unparseable_dates: true,
            drop_duplicate_rows: false,
        }
    }
}

/// Stage A settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputeConfig {
    pub targets: Vec<String>,
    pub group_key: GroupKey,
    pub all_null_policy: AllNullPolicy,
}

impl Default for ImputeConfig {
    fn default() -> Self {
        Self {
            targets: vec!["SO2 AQI".to_string(), "CO AQI".to_string()],
            group_key: GroupKey::City,
            all_null_policy: AllNullPolicy::LeaveNull,
        }
    }
}

/// Stage B settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub targets: Vec<String>,
    pub scope: OutlierScope,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            targets: ["NO2 AQI", "O3 AQI", "SO2 AQI", "CO AQI"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scope: OutlierScope::Dataset,
        }
    }
}

/// Complete configuration of a cleaning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub load: LoadConfig,
    pub impute: ImputeConfig,
    pub outliers: OutlierConfig,
}

impl CleaningConfig {
    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loader settings with every cleaning target registered as a numeric hint,
    /// so a target that happens to be all-empty still loads as a measurement.
    pub fn load_config(&self) -> LoadConfig {
        let mut load = self.load.clone();
        for name in self.impute.targets.iter().chain(&self.outliers.targets) {
            if !load.measurement_hints.contains(name) {
                load.measurement_hints.push(name.clone());
            }
        }
        load
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_dashboard_run() {
        let cfg = CleaningConfig::default();
        assert_eq!(cfg.impute.targets, vec!["SO2 AQI", "CO AQI"]);
        assert_eq!(cfg.impute.group_key, GroupKey::City);
        assert_eq!(cfg.outliers.targets.len(), 4);
        assert_eq!(cfg.outliers.scope, OutlierScope::Dataset);
        assert!(cfg.load.drop_unparseable_dates);
        assert!(cfg.load.index_columns.contains(&"Unnamed: 0".to_string()));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = CleaningConfig::from_toml_str(
            r#"
            [load]
            drop_unparseable_dates = false
            date = "Date"

            [impute]
            targets = ["CO AQI"]
            group_key = "state"
            all_null_policy = "global_median"

            [outliers]
            scope = { group = "county" }
            "#,
        )
        .unwrap();

        assert!(!cfg.load.drop_unparseable_dates);
        assert_eq!(cfg.load.fields.date, "Date");
        assert_eq!(cfg.load.fields.city, "City");
        assert_eq!(cfg.impute.targets, vec!["CO AQI"]);
        assert_eq!(cfg.impute.group_key, GroupKey::State);
        assert_eq!(cfg.impute.all_null_policy, AllNullPolicy::GlobalMedian);
        assert_eq!(cfg.outliers.scope, OutlierScope::Group(GroupKey::County));
        assert_eq!(cfg.outliers.targets.len(), 4);
    }

    #[test]
    fn unknown_group_key_is_rejected() {
        let err = CleaningConfig::from_toml_str("[impute]\ngroup_key = \"site\"\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_config_registers_targets_as_hints() {
        let load = CleaningConfig::default().load_config();
        for name in ["SO2 AQI", "CO AQI", "NO2 AQI", "O3 AQI"] {
            assert!(load.measurement_hints.iter().any(|h| h == name));
        }
        assert_eq!(load.measurement_hints.len(), 4);
    }
}
