//! aqclean - Air-quality CSV cleaning & summary tool
//!
//! Cleans a pollutant table and prints dashboard summaries as JSON.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use aqclean::data::{export, DataProcessor};
use aqclean::stats::{Aggregation, Aggregator, GroupBy, StatsCalculator};
use aqclean::{load, CleaningConfig, CleaningPipeline, Dataset};

#[derive(Parser)]
#[command(name = "aqclean")]
#[command(about = "Clean and summarize air-quality CSV data")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Impute missing values, replace outliers, write the cleaned table
    Clean {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Write the cleaning report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
        /// Keep rows with unparseable dates (date left empty)
        #[arg(long)]
        keep_unparseable_dates: bool,
    },
    /// Grouped aggregate table (state, county, city, state_county, date, month, state_season)
    Summary {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, default_value = "state")]
        by: GroupBy,
        #[arg(long, default_value = "mean")]
        agg: Aggregation,
        /// Comma-separated measurement columns (defaults to the outlier targets)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Keep only the N highest groups, ranked by the columns in order
        #[arg(long)]
        top: Option<usize>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Run the cleaning pipeline before summarizing
        #[arg(long)]
        clean: bool,
    },
    /// Pearson correlation matrix between measurement columns
    Correlate {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Correlate per-group means instead of individual rows
        #[arg(long)]
        by: Option<GroupBy>,
        #[arg(long)]
        clean: bool,
    },
    /// Descriptive statistics per measurement column
    Describe {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long)]
        clean: bool,
    },
    /// Null counts per column
    Missing {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Per-state days whose maximum exceeds a quantile of all daily maxima
    HighDays {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long, default_value_t = 0.95)]
        quantile: f64,
        #[arg(long)]
        clean: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => CleaningConfig::from_file(path)?,
        None => CleaningConfig::default(),
    };

    match cli.command {
        Commands::Clean {
            input,
            output,
            report,
            keep_unparseable_dates,
        } => {
            if keep_unparseable_dates {
                config.load.drop_unparseable_dates = false;
            }
            let dataset = read(&input, &config)?;
            let (cleaned, cleaning_report) = CleaningPipeline::run(dataset, &config)?;

            export::write_csv(&cleaned, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote {} rows to {}", cleaned.len(), output.display());

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&cleaning_report)?;
                std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                info!("Wrote report to {}", path.display());
            }
        }
        Commands::Summary {
            input,
            by,
            agg,
            columns,
            top,
            start,
            end,
            clean,
        } => {
            let dataset = prepare(&input, &config, clean)?;
            let dataset = match DataProcessor::date_span(&dataset) {
                Some((lo, hi)) if start.is_some() || end.is_some() => {
                    DataProcessor::filter_by_date_range(
                        &dataset,
                        start.unwrap_or(lo),
                        end.unwrap_or(hi),
                    )
                }
                _ => dataset,
            };
            let columns = or_default_columns(columns, &config);

            let mut table = Aggregator::group_aggregate(&dataset, by, &columns, agg);
            if let Some(n) = top {
                table = table.top_n(&columns, n);
            }
            print_json(&table)?;
        }
        Commands::Correlate {
            input,
            columns,
            by,
            clean,
        } => {
            let dataset = prepare(&input, &config, clean)?;
            let columns = or_default_columns(columns, &config);
            let matrix = match by {
                Some(by) => {
                    Aggregator::group_aggregate(&dataset, by, &columns, Aggregation::Mean)
                        .correlation()
                }
                None => StatsCalculator::correlation_matrix(&dataset, &columns),
            };
            print_json(&matrix)?;
        }
        Commands::Describe {
            input,
            columns,
            clean,
        } => {
            let dataset = prepare(&input, &config, clean)?;
            let columns = if columns.is_empty() {
                dataset.measurement_names.clone()
            } else {
                columns
            };
            print_json(&StatsCalculator::describe(&dataset, &columns))?;
        }
        Commands::Missing { input } => {
            let dataset = read(&input, &config)?;
            print_json(&DataProcessor::missing_counts(&dataset))?;
        }
        Commands::HighDays {
            input,
            columns,
            quantile,
            clean,
        } => {
            let dataset = prepare(&input, &config, clean)?;
            let columns = or_default_columns(columns, &config);
            print_json(&Aggregator::high_pollution_days(&dataset, &columns, quantile))?;
        }
    }

    Ok(())
}

fn read(input: &Path, config: &CleaningConfig) -> Result<Dataset> {
    load(input, &config.load_config()).with_context(|| format!("loading {}", input.display()))
}

fn prepare(input: &Path, config: &CleaningConfig, clean: bool) -> Result<Dataset> {
    let dataset = read(input, config)?;
    if !clean {
        return Ok(dataset);
    }
    let (cleaned, _) = CleaningPipeline::run(dataset, config)?;
    Ok(cleaned)
}

fn or_default_columns(columns: Vec<String>, config: &CleaningConfig) -> Vec<String> {
    if columns.is_empty() {
        config.outliers.targets.clone()
    } else {
        columns
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
