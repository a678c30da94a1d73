use thiserror::Error;

use crate::types::{MetricId, Time};

/// Fatal conditions raised while pulling slots out of a [`crate::fill::FillCursor`].
///
/// Running past the end of the grid is not one of them; that is reported as
/// [`crate::fill::Pull::End`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FillError {
    #[error("the point MetricID {found} differs from other {expected}")]
    WrongMetricId { found: MetricId, expected: MetricId },

    #[error("the time is less or equal to previous {time} <= {last}: points are unsorted")]
    PointsUnsorted { time: Time, last: Time },
}

/// Custom error type for the normalization pipeline.
#[derive(Error, Debug)]
pub enum PointError {
    #[error("Fill error: {0}")]
    Fill(#[from] FillError),

    #[error("Invalid step: step must be greater than zero")]
    InvalidStep,

    #[error("Invalid time range: from={from}, until={until}")]
    InvalidTimeRange { from: Time, until: Time },

    #[error("Metrics unsorted: metric {found} follows metric {previous}")]
    MetricsUnsorted { previous: MetricId, found: MetricId },

    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Point source error: {0}")]
    Source(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),
}
