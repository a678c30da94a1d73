//! Normalizer: dedup and grid filling for one metric or a batch of metrics,
//! with per-series failure isolation and a rayon fan-out for wide batches.

use crate::compact;
use crate::error::PointError;
use crate::fill::{FillCursor, Slot};
use crate::grid::Grid;
use crate::source::PointSource;
use crate::telemetry::{noop_event_listener, pipeline_metrics, NormalizeEvent, NormalizeEventListener};
use crate::types::{sort_points, MetricId, Point, PointBuffer, Time, Value};

use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// Default minimum number of metrics in a batch before filling goes parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 8;

/// Configuration options for the Normalizer
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Omit the trailing partial step when aligning the grid
    pub approximate_aggregate: bool,
    /// Collapse duplicate `(metric_id, time)` keys before filling
    pub dedup: bool,
    /// Sort input by `(metric_id, time)` instead of trusting the source order
    pub sort_input: bool,
    /// Batches with at least this many metrics are filled on the rayon pool
    pub parallel_threshold: usize,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn NormalizeEventListener>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            approximate_aggregate: false,
            dedup: true,
            sort_input: false,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            event_listener: noop_event_listener(),
        }
    }
}

/// Requested render window: `[from, until]` at `step` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: Time,
    pub until: Time,
    pub step: Time,
}

impl Window {
    pub fn new(from: Time, until: Time, step: Time) -> Self {
        Window { from, until, step }
    }
}

/// A fully rasterized series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub metric_id: MetricId,
    pub grid: Grid,
    pub slots: Vec<Slot>,
}

impl Series {
    /// Slot values with gaps as quiet NaN.
    pub fn values_or_nan(&self) -> Vec<Value> {
        self.slots.iter().map(|s| s.as_f64()).collect()
    }

    pub fn gap_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_gap()).count()
    }

    /// Pairs each slot with its grid time.
    ///
    /// Slot times are derived from `grid.start()` and `grid.step()`, so series whose
    /// input carried off-grid times are labeled by position.
    pub fn timed_slots(&self) -> impl Iterator<Item = (Time, Slot)> + '_ {
        let step = self.grid.step();
        let start = self.grid.start();
        self.slots
            .iter()
            .enumerate()
            .map(move |(i, s)| (start.saturating_add((i as Time).saturating_mul(step)), *s))
    }
}

/// Result for one metric of a batch.
#[derive(Debug)]
pub struct SeriesResult {
    pub metric_id: MetricId,
    pub result: Result<Series, PointError>,
}

/// Turns raw storage points into clean, fixed-step series.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: NormalizerConfig) -> Self {
        Normalizer { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Dedups and fills a single-metric sequence in place.
    ///
    /// # Errors
    /// Grid alignment errors, or a [`crate::error::FillError`] when the points
    /// mix metrics or are out of order.
    pub fn normalize_series(&self, points: &mut [Point], window: &Window) -> Result<Series, PointError> {
        let started = Instant::now();
        let grid = Grid::align(window.from, window.until, window.step, self.config.approximate_aggregate)?;
        let live = self.prepare(points);
        let metric_id = live.first().map_or(0, |p| p.metric_id);
        let series = self.fill(metric_id, live, grid);
        pipeline_metrics::record_normalize(started.elapsed());
        series
    }

    /// Dedups a multi-metric batch and fills every metric independently.
    ///
    /// Results come back in the order metrics appear in the (possibly sorted)
    /// batch, one per contiguous run. A run whose metric id is not greater than
    /// every id before it fails with [`PointError::MetricsUnsorted`]. A failing
    /// series does not affect its siblings. Grid alignment errors fail the
    /// whole batch since every series shares the window.
    pub fn normalize_batch(&self, points: Vec<Point>, window: &Window) -> Result<Vec<SeriesResult>, PointError> {
        let started = Instant::now();
        let grid = Grid::align(window.from, window.until, window.step, self.config.approximate_aggregate)?;

        let mut buffer = PointBuffer::from(points);
        let input = buffer.len();
        if self.config.sort_input {
            buffer.sort();
        }
        let output = if self.config.dedup {
            buffer.uniq()
        } else {
            buffer.clean_up()
        };
        self.record_prepared(input, output);
        let live = buffer.as_slice();

        // A run at or below the highest earlier metric id carries that id as its
        // rejection. Decided sequentially so the fan-out sees a fixed verdict.
        let mut highest: Option<MetricId> = None;
        let runs: Vec<(&[Point], Option<MetricId>)> = live
            .chunk_by(|a, b| a.metric_id == b.metric_id)
            .map(|run| {
                let metric_id = run[0].metric_id;
                let out_of_order = highest.filter(|&h| metric_id <= h);
                highest = Some(highest.map_or(metric_id, |h| h.max(metric_id)));
                (run, out_of_order)
            })
            .collect();

        let fill_run = |&(run, out_of_order): &(&[Point], Option<MetricId>)| -> SeriesResult {
            let metric_id = run[0].metric_id;
            if let Some(previous) = out_of_order {
                let err = PointError::MetricsUnsorted {
                    previous,
                    found: metric_id,
                };
                self.reject(metric_id, &err);
                return SeriesResult {
                    metric_id,
                    result: Err(err),
                };
            }
            SeriesResult {
                metric_id,
                result: self.fill(metric_id, run, grid),
            }
        };

        let results: Vec<SeriesResult> = if runs.len() >= self.config.parallel_threshold {
            runs.par_iter().map(fill_run).collect()
        } else {
            runs.iter().map(fill_run).collect()
        };

        pipeline_metrics::record_normalize(started.elapsed());
        Ok(results)
    }

    /// Fetches `metric_ids` from `source` over the window and normalizes them.
    pub fn fetch_and_normalize(
        &self,
        source: &dyn PointSource,
        metric_ids: &[MetricId],
        window: &Window,
    ) -> Result<Vec<SeriesResult>, PointError> {
        let points = source.fetch(metric_ids, window.from, window.until)?;
        self.normalize_batch(points, window)
    }

    /// Sorts and dedups according to config. Returns the live prefix.
    fn prepare<'p>(&self, points: &'p mut [Point]) -> &'p mut [Point] {
        if self.config.sort_input {
            sort_points(points);
        }
        let input = points.len();
        let live = if self.config.dedup {
            compact::uniq(points)
        } else {
            compact::clean_up(points)
        };
        self.record_prepared(input, live.len());
        live
    }

    fn record_prepared(&self, input: usize, output: usize) {
        pipeline_metrics::record_dedup(input as u64, output as u64);
        self.config
            .event_listener
            .on_event(NormalizeEvent::BatchDeduplicated { input, output });
    }

    fn fill(&self, metric_id: MetricId, points: &[Point], grid: Grid) -> Result<Series, PointError> {
        match FillCursor::new(points, grid).collect_slots() {
            Ok(slots) => {
                let series = Series {
                    metric_id,
                    grid,
                    slots,
                };
                let gaps = series.gap_count();
                pipeline_metrics::record_series(series.slots.len() as u64, gaps as u64);
                self.config.event_listener.on_event(NormalizeEvent::SeriesRendered {
                    metric_id,
                    slots: series.slots.len(),
                    gaps,
                });
                Ok(series)
            }
            Err(e) => {
                let err = PointError::from(e);
                self.reject(metric_id, &err);
                Err(err)
            }
        }
    }

    fn reject(&self, metric_id: MetricId, err: &PointError) {
        pipeline_metrics::record_series_failed();
        self.config.event_listener.on_event(NormalizeEvent::SeriesRejected {
            metric_id,
            error: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FillError;
    use crate::source::InMemorySource;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recording(Mutex<Vec<NormalizeEvent>>);

    impl NormalizeEventListener for Recording {
        fn on_event(&self, event: NormalizeEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn p(metric_id: MetricId, time: Time, value: Value, timestamp: u32) -> Point {
        Point::new(metric_id, time, value, timestamp)
    }

    #[test]
    fn test_normalize_series_dedups_then_fills() {
        let mut points = vec![p(1, 10, 1.0, 1), p(1, 10, 1.5, 2), p(1, 30, 3.0, 1)];
        let series = Normalizer::new()
            .normalize_series(&mut points, &Window::new(10, 30, 10))
            .unwrap();
        assert_eq!(series.metric_id, 1);
        assert_eq!(series.slots, vec![Slot::Value(1.5), Slot::Gap, Slot::Value(3.0)]);
        assert_eq!(series.gap_count(), 1);
        let times: Vec<Time> = series.timed_slots().map(|(t, _)| t).collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[test]
    fn test_normalize_series_without_dedup_sees_duplicates() {
        let config = NormalizerConfig {
            dedup: false,
            ..NormalizerConfig::default()
        };
        let mut points = vec![p(1, 10, 1.0, 1), p(1, 10, 1.5, 2)];
        let err = Normalizer::with_config(config)
            .normalize_series(&mut points, &Window::new(10, 30, 10))
            .unwrap_err();
        assert!(matches!(
            err,
            PointError::Fill(FillError::PointsUnsorted { time: 10, last: 10 })
        ));
    }

    #[test]
    fn test_normalize_series_rejects_mixed_metrics() {
        let mut points = vec![p(1, 10, 1.0, 1), p(2, 20, 2.0, 1)];
        let err = Normalizer::new()
            .normalize_series(&mut points, &Window::new(10, 30, 10))
            .unwrap_err();
        assert!(matches!(
            err,
            PointError::Fill(FillError::WrongMetricId { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_normalize_batch_isolates_failures() {
        let rec = Arc::new(Recording::default());
        let config = NormalizerConfig {
            event_listener: rec.clone(),
            ..NormalizerConfig::default()
        };
        // metric 1 then 3 then 2 again: the last run is out of metric order
        let points = vec![p(1, 10, 1.0, 1), p(3, 20, 3.0, 1), p(2, 10, 2.0, 1)];
        let results = Normalizer::with_config(config)
            .normalize_batch(points, &Window::new(10, 20, 10))
            .unwrap();

        assert_eq!(results.len(), 3);
        let ok = results[0].result.as_ref().unwrap();
        assert_eq!(ok.slots, vec![Slot::Value(1.0), Slot::Gap]);
        assert!(results[1].result.is_ok());
        assert!(matches!(
            results[2].result,
            Err(PointError::MetricsUnsorted { previous: 3, found: 2 })
        ));

        let events = rec.0.lock().unwrap();
        assert_eq!(events[0], NormalizeEvent::BatchDeduplicated { input: 3, output: 3 });
        assert!(events
            .iter()
            .any(|e| matches!(e, NormalizeEvent::SeriesRejected { metric_id: 2, .. })));
    }

    #[test]
    fn test_normalize_batch_rejects_runs_at_or_below_highest_metric() {
        // 2 follows 1 but both trail 5, and 5 comes back for a second run
        let points = vec![p(5, 10, 5.0, 1), p(1, 10, 1.0, 1), p(2, 10, 2.0, 1), p(5, 20, 5.5, 1)];
        for parallel_threshold in [1, DEFAULT_PARALLEL_THRESHOLD] {
            let config = NormalizerConfig {
                parallel_threshold,
                ..NormalizerConfig::default()
            };
            let results = Normalizer::with_config(config)
                .normalize_batch(points.clone(), &Window::new(10, 20, 10))
                .unwrap();

            let ids: Vec<MetricId> = results.iter().map(|r| r.metric_id).collect();
            assert_eq!(ids, vec![5, 1, 2, 5]);
            assert_eq!(
                results[0].result.as_ref().unwrap().slots,
                vec![Slot::Value(5.0), Slot::Gap]
            );
            for (result, found) in results[1..].iter().zip([1, 2, 5]) {
                assert!(
                    matches!(result.result, Err(PointError::MetricsUnsorted { previous: 5, found: f }) if f == found),
                    "{:?}",
                    result
                );
            }
            assert_eq!(results.iter().filter(|r| r.result.is_ok()).count(), 1);
        }
    }

    #[test]
    fn test_normalize_batch_sorts_when_asked() {
        let config = NormalizerConfig {
            sort_input: true,
            parallel_threshold: 1,
            ..NormalizerConfig::default()
        };
        let points = vec![
            p(2, 20, 2.2, 1),
            p(1, 20, 1.2, 1),
            p(2, 10, 2.1, 1),
            p(1, 10, 1.1, 1),
            p(1, 10, 1.0, 0),
        ];
        let results = Normalizer::with_config(config)
            .normalize_batch(points, &Window::new(10, 20, 10))
            .unwrap();
        let ids: Vec<MetricId> = results.iter().map(|r| r.metric_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(
            results[0].result.as_ref().unwrap().values_or_nan(),
            vec![1.1, 1.2]
        );
        assert_eq!(
            results[1].result.as_ref().unwrap().values_or_nan(),
            vec![2.1, 2.2]
        );
    }

    #[test]
    fn test_normalize_batch_rejects_bad_window() {
        assert!(matches!(
            Normalizer::new().normalize_batch(vec![], &Window::new(0, 10, 0)),
            Err(PointError::InvalidStep)
        ));
        let results = Normalizer::new()
            .normalize_batch(vec![], &Window::new(0, 10, 10))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_fetch_and_normalize() {
        let source = InMemorySource::new(vec![
            p(7, 60, 1.0, 1),
            p(7, 180, 3.0, 1),
            p(8, 120, 2.0, 1),
            p(9, 120, 9.0, 1),
        ]);
        let results = Normalizer::new()
            .fetch_and_normalize(&source, &[7, 8], &Window::new(60, 180, 60))
            .unwrap();
        assert_eq!(results.len(), 2);
        let s7 = results[0].result.as_ref().unwrap();
        assert_eq!(s7.slots, vec![Slot::Value(1.0), Slot::Gap, Slot::Value(3.0)]);
        let s8 = results[1].result.as_ref().unwrap();
        assert_eq!(s8.slots, vec![Slot::Gap, Slot::Value(2.0), Slot::Gap]);
    }
}
