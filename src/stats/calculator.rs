//! Statistics Calculator Module
//! Order statistics, IQR fences, descriptive summaries and correlations.

use rayon::prelude::*;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::data::Dataset;

/// Multiplier applied to the IQR to place the outlier fences.
pub const IQR_FENCE: f64 = 1.5;

/// Quartile fences for one column (or one group of a column).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutlierBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    /// Fences from the non-null values of a column. `None` when empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sorted = StatsCalculator::sorted(values);
        let q1 = StatsCalculator::percentile(&sorted, 25.0);
        let q3 = StatsCalculator::percentile(&sorted, 75.0);
        let iqr = q3 - q1;

        Some(Self {
            q1,
            q3,
            iqr,
            lower: q1 - IQR_FENCE * iqr,
            upper: q3 + IQR_FENCE * iqr,
        })
    }

    /// Strict comparison: values sitting exactly on a fence are kept.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Descriptive statistics for one column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnStats {
    pub column: String,
    pub count: usize,
    pub nulls: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self {
            column: String::new(),
            count: 0,
            nulls: 0,
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            q1: f64::NAN,
            median: f64::NAN,
            q3: f64::NAN,
            max: f64::NAN,
        }
    }
}

/// Pairwise Pearson coefficients. `None` where undefined
/// (fewer than two shared observations or a constant column).
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

/// Statistical helpers over plain value slices and datasets.
pub struct StatsCalculator;

impl StatsCalculator {
    fn sorted(values: &[f64]) -> Vec<f64> {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }

    /// Order-statistic median; average of the two middle values for even counts.
    pub fn median(values: &[f64]) -> Option<f64> {
        let n = values.len();
        if n == 0 {
            return None;
        }
        let sorted = Self::sorted(values);
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        Some(median)
    }

    /// Quantile `q` in `[0, 1]` with linear interpolation.
    pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let sorted = Self::sorted(values);
        Some(Self::percentile(&sorted, q.clamp(0.0, 1.0) * 100.0))
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }

    /// Compute descriptive statistics for an array of values.
    pub fn compute_descriptive_stats(values: &[f64]) -> ColumnStats {
        let n = values.len();
        if n == 0 {
            return ColumnStats::default();
        }

        let sorted = Self::sorted(values);
        let mean = values.iter().sum::<f64>() / n as f64;
        // sample standard deviation (n - 1); NaN for a single value
        let std = values.iter().std_dev();

        ColumnStats {
            count: n,
            mean,
            std,
            min: sorted[0],
            q1: Self::percentile(&sorted, 25.0),
            median: Self::percentile(&sorted, 50.0),
            q3: Self::percentile(&sorted, 75.0),
            max: sorted[n - 1],
            ..ColumnStats::default()
        }
    }

    /// Summary table for the given measurement columns, computed in parallel.
    pub fn describe(dataset: &Dataset, columns: &[String]) -> Vec<ColumnStats> {
        columns
            .par_iter()
            .filter(|name| dataset.has_measurement(name))
            .map(|name| {
                let values = dataset.non_null_values(name);
                let mut stats = Self::compute_descriptive_stats(&values);
                stats.column = name.clone();
                stats.nulls = dataset.len() - values.len();
                stats
            })
            .collect()
    }

    /// Pearson correlation over paired observations.
    pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
        if x.len() != y.len() || x.len() < 2 {
            return None;
        }
        let sx = x.iter().std_dev();
        let sy = y.iter().std_dev();
        if !(sx > 0.0 && sy > 0.0) {
            return None;
        }
        let r = x.iter().covariance(y.iter()) / (sx * sy);
        r.is_finite().then_some(r.clamp(-1.0, 1.0))
    }

    /// Correlation matrix among measurement columns.
    ///
    /// Each pair uses only rows where both values are present. Unknown column
    /// names are skipped.
    pub fn correlation_matrix(dataset: &Dataset, columns: &[String]) -> CorrelationMatrix {
        let columns: Vec<String> = columns
            .iter()
            .filter(|c| dataset.has_measurement(c))
            .cloned()
            .collect();
        let series: Vec<Vec<Option<f64>>> =
            columns.iter().map(|c| dataset.column_values(c)).collect();
        Self::correlate_series(columns, &series)
    }

    /// Pairwise-complete Pearson matrix over aligned series, one per column name.
    pub(crate) fn correlate_series(
        columns: Vec<String>,
        series: &[Vec<Option<f64>>],
    ) -> CorrelationMatrix {
        let values = series
            .par_iter()
            .map(|a| {
                series
                    .iter()
                    .map(|b| {
                        let (xs, ys): (Vec<f64>, Vec<f64>) = a
                            .iter()
                            .zip(b)
                            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                            .unzip();
                        Self::pearson(&xs, &ys)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        CorrelationMatrix { columns, values }
    }
}
