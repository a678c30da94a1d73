#![doc = include_str!("../README.md")]
// Declare modules
pub mod compact;
pub mod core;
pub mod error;
pub mod fill;
pub mod grid;
pub mod source;
pub mod telemetry;
pub mod types;

/// Removes tombstoned and valueless points in place.
pub use crate::compact::clean_up;
/// Collapses duplicate `(metric_id, time)` keys in a sorted sequence.
pub use crate::compact::uniq;
/// Batch/series orchestration.
pub use crate::core::{Normalizer, NormalizerConfig, Series, SeriesResult, Window};
/// Error types.
pub use crate::error::{FillError, PointError};
/// Grid alignment and the pull-based slot producer.
pub use crate::fill::{fill_nulls, FillCursor, Pull, Slot};
pub use crate::grid::Grid;
/// Storage collaborator interface.
pub use crate::source::{InMemorySource, PointSource};
/// Structured event hook for observability.
pub use crate::telemetry::{NormalizeEvent, NormalizeEventListener};
/// Point model.
pub use crate::types::{MetricId, Point, PointBuffer, Time, Timestamp, Value};
