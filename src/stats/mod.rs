//! Statistics module - order statistics, cleaning fences and dashboard aggregates

mod aggregate;
mod calculator;

pub use aggregate::{
    AggregateRow, AggregateTable, Aggregation, Aggregator, GroupBy, HighPollutionDay, Season,
};
pub use calculator::{ColumnStats, CorrelationMatrix, OutlierBounds, StatsCalculator, IQR_FENCE};
