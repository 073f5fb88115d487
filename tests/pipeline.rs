use std::io::Write;

use aqclean::cleaning::{remove_outliers, OutlierScope};
use aqclean::data::{export, DataProcessor};
use aqclean::stats::{Aggregation, Aggregator, GroupBy};
use aqclean::{load, CleaningConfig, CleaningPipeline, DataLoadError, GroupKey, SchemaError};
use tempfile::NamedTempFile;

const CSV: &str = "\
Unnamed: 0,State Code,State,County,City,Date Local,NO2 Units,NO2 AQI,SO2 AQI
0,4,Arizona,Maricopa,Phoenix,2000-01-01,Parts per billion,46,
1,4,Arizona,Maricopa,Phoenix,2000-01-02,Parts per billion,34,10
2,4,Arizona,Maricopa,Phoenix,2000-01-03,Parts per billion,38,20
3,4,Arizona,Maricopa,Phoenix,2000-01-04,Parts per billion,40,
4,48,Texas,Harris,Houston,2000-01-01,Parts per billion,36,5
5,48,Texas,Harris,Houston,bad-date,Parts per billion,35,
6,48,Texas,Harris,Houston,2000-01-03,Parts per billion,37,
7,48,Texas,Harris,Houston,2000-01-04,Parts per billion,250,
";

fn write_fixture(text: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn config() -> CleaningConfig {
    let mut config = CleaningConfig::default();
    config.impute.targets = vec!["SO2 AQI".to_string()];
    config.outliers.targets = vec!["NO2 AQI".to_string()];
    config
}

#[test]
fn loads_and_normalizes_fixture() {
    let file = write_fixture(CSV);
    let ds = load(file.path(), &config().load_config()).unwrap();

    assert_eq!(ds.len(), 7);
    assert!(ds.records.iter().all(|r| r.row != 5));
    assert!(ds.has_measurement("NO2 AQI"));
    assert!(ds.has_measurement("SO2 AQI"));
    assert!(ds.has_measurement("State Code"));
    assert!(!ds.has_measurement("Unnamed: 0"));
    assert_eq!(ds.attribute_names, vec!["NO2 Units"]);
    assert_eq!(
        DataProcessor::unique_values(&ds, GroupKey::City),
        vec!["Houston", "Phoenix"]
    );
}

#[test]
fn keeps_unparseable_dates_when_configured() {
    let file = write_fixture(CSV);
    let mut config = config();
    config.load.drop_unparseable_dates = false;

    let ds = load(file.path(), &config.load_config()).unwrap();
    assert_eq!(ds.len(), 8);
    assert_eq!(ds.records[5].date, None);
    assert_eq!(ds.records[5].city.as_deref(), Some("Houston"));
}

#[test]
fn cleans_fixture_end_to_end() {
    let file = write_fixture(CSV);
    let config = config();
    let ds = load(file.path(), &config.load_config()).unwrap();

    let (cleaned, report) = CleaningPipeline::run(ds, &config).unwrap();

    let so2: Vec<Option<f64>> = cleaned.column_values("SO2 AQI");
    assert_eq!(
        so2,
        vec![Some(15.0), Some(10.0), Some(20.0), Some(15.0), Some(5.0), Some(5.0), Some(5.0)]
    );
    assert_eq!(report.imputation.total_unresolved(), 0);

    let no2 = report.outliers.column("NO2 AQI").unwrap();
    assert_eq!(no2.hits.len(), 1);
    assert_eq!(no2.hits[0].row, 7);
    assert_eq!(no2.hits[0].original, 250.0);
    assert_eq!(no2.hits[0].replacement, 38.0);
    assert_eq!(cleaned.records[6].value("NO2 AQI"), Some(38.0));
}

#[test]
fn second_pass_recomputes_tighter_fences() {
    let file = write_fixture(CSV);
    let config = config();
    let ds = load(file.path(), &config.load_config()).unwrap();
    let (cleaned, first) = CleaningPipeline::run(ds, &config).unwrap();
    let first_bounds = first.outliers.column("NO2 AQI").unwrap().bounds[0].bounds;
    assert_eq!(first_bounds.upper, 52.75);

    // replacing 250 with 38 shrinks the IQR, so 46 now sits past the upper fence
    let (_, again) = remove_outliers(cleaned, &config.outliers.targets).unwrap();
    let no2 = again.column("NO2 AQI").unwrap();
    assert_eq!(no2.bounds[0].bounds.upper, 42.75);
    assert_eq!(no2.hits.len(), 1);
    assert_eq!(no2.hits[0].row, 0);
    assert_eq!(no2.hits[0].original, 46.0);
    assert_eq!(no2.hits[0].replacement, 38.0);
}

#[test]
fn cleaned_table_survives_export_and_reload() {
    let file = write_fixture(CSV);
    let config = config();
    let ds = load(file.path(), &config.load_config()).unwrap();
    let (cleaned, _) = CleaningPipeline::run(ds, &config).unwrap();

    let out = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    export::write_csv(&cleaned, out.path()).unwrap();
    let reloaded = load(out.path(), &config.load_config()).unwrap();

    assert_eq!(reloaded.len(), cleaned.len());
    assert_eq!(reloaded.column_values("SO2 AQI"), cleaned.column_values("SO2 AQI"));
    assert_eq!(reloaded.column_values("NO2 AQI"), cleaned.column_values("NO2 AQI"));
    assert_eq!(reloaded.records[0].date, cleaned.records[0].date);
}

#[test]
fn missing_target_column_fails_with_schema_error() {
    let file = write_fixture(CSV);
    let config = CleaningConfig::default();
    let ds = load(file.path(), &config.load_config()).unwrap();

    let err = CleaningPipeline::run(ds, &config).unwrap_err();
    assert_eq!(
        err,
        SchemaError::MissingMeasurement {
            column: "CO AQI".to_string()
        }
    );
}

#[test]
fn grouped_scope_and_state_summary() {
    let file = write_fixture(CSV);
    let mut config = config();
    config.outliers.scope = OutlierScope::Group(GroupKey::State);
    let ds = load(file.path(), &config.load_config()).unwrap();

    let (cleaned, report) = CleaningPipeline::run(ds, &config).unwrap();
    assert_eq!(report.outliers.column("NO2 AQI").unwrap().bounds.len(), 2);

    let table = Aggregator::group_aggregate(
        &cleaned,
        GroupBy::State,
        &["SO2 AQI".to_string()],
        Aggregation::Mean,
    );
    assert_eq!(table.row(&["Arizona"]).unwrap().values["SO2 AQI"], Some(15.0));
    assert_eq!(table.row(&["Texas"]).unwrap().values["SO2 AQI"], Some(5.0));
}

#[test]
fn header_only_file_yields_empty_dataset() {
    let file = write_fixture("Date Local,State,County,City,NO2 AQI,SO2 AQI\n");
    let config = config();
    let ds = load(file.path(), &config.load_config()).unwrap();
    assert!(ds.is_empty());

    let (cleaned, report) = CleaningPipeline::run(ds, &config).unwrap();
    assert!(cleaned.is_empty());
    assert_eq!(report.outliers.total(), 0);
}

#[test]
fn unreadable_source_is_a_load_error() {
    let config = CleaningConfig::default().load_config();
    let err = load("/no/such/dir/pollution.csv", &config).unwrap_err();
    assert!(matches!(err, DataLoadError::NotFound(_)));
}
