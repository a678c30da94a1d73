//! Rasterizes a sorted single-metric point stream onto a fixed-step grid.
//!
//! [`fill_nulls`] aligns the requested window and hands back a [`FillCursor`]
//! that merges the sparse point stream with the dense grid in one forward pass,
//! producing one outcome per slot on demand.

use crate::error::{FillError, PointError};
use crate::grid::Grid;
use crate::types::{MetricId, Point, Time, Value};

/// Outcome of a single [`FillCursor::pull`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pull {
    /// A real sample occupies the slot.
    Value(Value),
    /// No sample for the slot.
    Gap,
    /// Every slot has been delivered.
    End,
}

/// A delivered grid slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    Value(Value),
    Gap,
}

impl Slot {
    /// Renders gaps as quiet NaN.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Slot::Value(v) => v,
            Slot::Gap => f64::NAN,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, Slot::Gap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Producing,
    Exhausted,
}

/// Pull-based producer of grid slots for one metric.
///
/// Cursor `last` is the time of the last delivered slot; `None` stands for the
/// virtual slot one step before `start`. Errors do not advance the cursor, so
/// pulling again reports the same error.
#[derive(Debug, Clone)]
pub struct FillCursor<'a> {
    points: &'a [Point],
    metric_id: MetricId,
    grid: Grid,
    last: Option<Time>,
    current: usize,
    state: CursorState,
    fused: bool,
}

/// Aligns `[from, until]` to `step` and returns the grid with a cursor over it.
///
/// `points` must hold a single metric sorted by time. The declared metric is
/// that of the first point.
///
/// # Errors
/// Only grid alignment can fail here; data problems surface from
/// [`FillCursor::pull`].
pub fn fill_nulls(
    points: &[Point],
    from: Time,
    until: Time,
    step: Time,
    approximate_aggregate: bool,
) -> Result<(Grid, FillCursor<'_>), PointError> {
    let grid = Grid::align(from, until, step, approximate_aggregate)?;
    Ok((grid, FillCursor::new(points, grid)))
}

impl<'a> FillCursor<'a> {
    pub fn new(points: &'a [Point], grid: Grid) -> Self {
        FillCursor {
            points,
            metric_id: points.first().map_or(0, |p| p.metric_id),
            grid,
            last: None,
            current: 0,
            state: CursorState::Producing,
            fused: false,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn metric_id(&self) -> MetricId {
        self.metric_id
    }

    /// The slot after `last`, widened so `last + step` cannot overflow.
    #[inline]
    fn next_slot(&self) -> u64 {
        match self.last {
            None => u64::from(self.grid.start()),
            Some(last) => u64::from(last) + u64::from(self.grid.step()),
        }
    }

    fn exhaust(&mut self) -> Pull {
        self.state = CursorState::Exhausted;
        Pull::End
    }

    /// Produces the outcome for the next grid slot.
    pub fn pull(&mut self) -> Result<Pull, FillError> {
        if self.state == CursorState::Exhausted {
            return Ok(Pull::End);
        }
        let stop = self.grid.stop();
        if self.last.is_some_and(|last| stop <= last) {
            return Ok(self.exhaust());
        }

        for i in self.current..self.points.len() {
            let point = self.points[i];
            if point.metric_id != self.metric_id {
                return Err(FillError::WrongMetricId {
                    found: point.metric_id,
                    expected: self.metric_id,
                });
            }
            if point.time < self.grid.start() {
                // predates the window
                self.current += 1;
                continue;
            }
            if let Some(last) = self.last {
                if point.time <= last {
                    return Err(FillError::PointsUnsorted {
                        time: point.time,
                        last,
                    });
                }
            }
            if stop <= point.time {
                break;
            }
            let next = self.next_slot();
            if next < u64::from(point.time) {
                // next < point.time, so it fits in Time
                self.last = Some(next as Time);
                return Ok(Pull::Gap);
            }
            self.last = Some(point.time);
            self.current = i + 1;
            return Ok(Pull::Value(point.value));
        }

        let next = self.next_slot();
        if next < u64::from(stop) {
            self.last = Some(next as Time);
            return Ok(Pull::Gap);
        }
        Ok(self.exhaust())
    }

    /// Drains the cursor into a vector of slots.
    pub fn collect_slots(mut self) -> Result<Vec<Slot>, FillError> {
        let mut slots = Vec::with_capacity(self.grid.count() as usize);
        loop {
            match self.pull()? {
                Pull::Value(v) => slots.push(Slot::Value(v)),
                Pull::Gap => slots.push(Slot::Gap),
                Pull::End => return Ok(slots),
            }
        }
    }
}

impl Iterator for FillCursor<'_> {
    type Item = Result<Slot, FillError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.pull() {
            Ok(Pull::Value(v)) => Some(Ok(Slot::Value(v))),
            Ok(Pull::Gap) => Some(Ok(Slot::Gap)),
            Ok(Pull::End) => None,
            Err(e) => {
                self.fused = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for FillCursor<'_> {}
