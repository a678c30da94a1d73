//! Fixed-step grid alignment for a requested `[from, until]` window.

use crate::error::PointError;
use crate::types::Time;

/// A half-open grid `[start, stop)` of `count` slots spaced `step` apart.
///
/// Only [`Grid::align`] builds one, so `step` is never zero:
///
/// ```compile_fail
/// let grid = pointgrid::Grid { start: 10, stop: 40, count: 3, step: 0 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    start: Time,
    stop: Time,
    count: u32,
    step: Time,
}

impl Grid {
    /// Aligns `[from, until]` to multiples of `step`.
    ///
    /// Without `approximate_aggregate` the first slot is the first multiple of
    /// `step` not before `from`, and the grid runs one step past the aligned
    /// `until`. With it, `from` is floored and the trailing step is omitted.
    ///
    /// # Errors
    /// `InvalidStep` for a zero step; `InvalidTimeRange` when the upper bound
    /// overflows or falls before the start.
    pub fn align(
        from: Time,
        until: Time,
        step: Time,
        approximate_aggregate: bool,
    ) -> Result<Self, PointError> {
        if step == 0 {
            return Err(PointError::InvalidStep);
        }
        let invalid = || PointError::InvalidTimeRange { from, until };

        let mut start = from - from % step;
        let stop;
        if !approximate_aggregate {
            if start < from {
                start = start.checked_add(step).ok_or_else(invalid)?;
            }
            stop = (until - until % step).checked_add(step).ok_or_else(invalid)?;
        } else {
            stop = until - until % step;
        }

        if stop < start {
            return Err(invalid());
        }

        Ok(Grid {
            start,
            stop,
            count: (stop - start) / step,
            step,
        })
    }

    pub fn start(&self) -> Time {
        self.start
    }

    /// Exclusive upper bound.
    pub fn stop(&self) -> Time {
        self.stop
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn step(&self) -> Time {
        self.step
    }

    /// Time of the slot at `index`, if it lies on the grid.
    pub fn slot_time(&self, index: u32) -> Option<Time> {
        if index >= self.count {
            return None;
        }
        Some(self.start + index * self.step)
    }

    /// Iterates over the times of every slot in order.
    pub fn slot_times(&self) -> impl Iterator<Item = Time> + '_ {
        (0..self.count).map(move |i| self.start + i * self.step)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
