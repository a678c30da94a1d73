use std::sync::Arc;

use crate::types::MetricId;

/// Structured, in-process event hook for observability.
///
/// This crate is a library and never prints. Callers provide an implementation
/// that forwards these events to `tracing`, `log`, metrics, or custom sinks.
pub trait NormalizeEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: NormalizeEvent);
}

/// Structured events emitted by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeEvent {
    /// Dedup and compaction finished for a batch.
    BatchDeduplicated { input: usize, output: usize },
    /// A series was rasterized successfully.
    SeriesRendered {
        metric_id: MetricId,
        slots: usize,
        gaps: usize,
    },
    /// A series failed; siblings are unaffected.
    SeriesRejected { metric_id: MetricId, error: String },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl NormalizeEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: NormalizeEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn NormalizeEventListener> {
    Arc::new(NoopEventListener)
}

/// Pipeline metrics.
///
/// Emitting is a no-op until a recorder is installed. With the `prometheus`
/// feature, [`pipeline_metrics::InProcessPrometheus`] installs one and renders
/// exposition text without an HTTP server.
pub mod pipeline_metrics {
    use std::time::Duration;

    use ::metrics::{describe_counter, describe_histogram, Unit};

    #[cfg(feature = "prometheus")]
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

    // Counters are exposed as `<name>_total` by the Prometheus exporter.

    pub const POINTS_INPUT: &str = "pointgrid_points_input";
    pub const POINTS_REMOVED: &str = "pointgrid_points_removed";
    pub const SLOTS_EMITTED: &str = "pointgrid_slots_emitted";
    pub const GAPS_FILLED: &str = "pointgrid_gaps_filled";
    pub const SERIES_FAILED: &str = "pointgrid_series_failed";
    pub const NORMALIZE_DURATION_SECONDS: &str = "pointgrid_normalize_duration_seconds";

    /// Global Prometheus recorder rendered in-process, without an HTTP listener.
    #[cfg(feature = "prometheus")]
    #[derive(Debug, Clone)]
    pub struct InProcessPrometheus {
        handle: PrometheusHandle,
    }

    #[cfg(feature = "prometheus")]
    impl InProcessPrometheus {
        /// Installs the global recorder. Fails if one is already installed.
        pub fn install() -> Result<Self, MetricsInitError> {
            describe_all();
            let handle = PrometheusBuilder::new().install_recorder()?;
            Ok(Self { handle })
        }

        /// Renders the Prometheus text exposition, draining histogram buckets first.
        pub fn render(&self) -> String {
            self.handle.run_upkeep();
            self.handle.render()
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    #[error("failed to install prometheus recorder: {0}")]
    pub struct MetricsInitError(#[from] BuildError);

    #[inline]
    pub fn record_dedup(input: u64, output: u64) {
        if input > 0 {
            ::metrics::counter!(POINTS_INPUT).increment(input);
        }
        let removed = input.saturating_sub(output);
        if removed > 0 {
            ::metrics::counter!(POINTS_REMOVED).increment(removed);
        }
    }

    #[inline]
    pub fn record_series(slots: u64, gaps: u64) {
        if slots > 0 {
            ::metrics::counter!(SLOTS_EMITTED).increment(slots);
        }
        if gaps > 0 {
            ::metrics::counter!(GAPS_FILLED).increment(gaps);
        }
    }

    #[inline]
    pub fn record_series_failed() {
        ::metrics::counter!(SERIES_FAILED).increment(1);
    }

    #[inline]
    pub fn record_normalize(duration: Duration) {
        ::metrics::histogram!(NORMALIZE_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Registers descriptions for every pipeline metric with the installed recorder.
    pub fn describe_all() {
        describe_counter!(
            POINTS_INPUT,
            Unit::Count,
            "Total number of raw points handed to the normalizer."
        );
        describe_counter!(
            POINTS_REMOVED,
            Unit::Count,
            "Total number of points dropped by dedup and compaction."
        );
        describe_counter!(
            SLOTS_EMITTED,
            Unit::Count,
            "Total number of grid slots delivered, gaps included."
        );
        describe_counter!(
            GAPS_FILLED,
            Unit::Count,
            "Total number of grid slots delivered without a sample."
        );
        describe_counter!(
            SERIES_FAILED,
            Unit::Count,
            "Total number of series rejected for unsorted or mixed-metric input."
        );
        describe_histogram!(
            NORMALIZE_DURATION_SECONDS,
            Unit::Seconds,
            "Wall time of one normalize_series or normalize_batch call."
        );
    }
}
