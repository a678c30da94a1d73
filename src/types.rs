use crate::compact;

/// Numeric series identifier. `0` marks a tombstoned entry.
pub type MetricId = u32;

/// Logical sample time (seconds since epoch).
pub type Time = u32;

/// Write/ingestion order marker used to break ties between duplicates.
pub type Timestamp = u32;

/// Value type.
pub type Value = f64;

/// Reserved metric id for entries that have been logically removed.
pub const TOMBSTONE: MetricId = 0;

/// A single observation as returned by the column store.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub metric_id: MetricId,
    pub time: Time,
    pub value: Value,
    pub timestamp: Timestamp,
}

impl Point {
    pub fn new(metric_id: MetricId, time: Time, value: Value, timestamp: Timestamp) -> Self {
        Point {
            metric_id,
            time,
            value,
            timestamp,
        }
    }

    /// Returns true if the point has been marked for removal.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.metric_id == TOMBSTONE
    }

    /// The dedup key.
    #[inline]
    pub fn key(&self) -> (MetricId, Time) {
        (self.metric_id, self.time)
    }
}

/// Stable sort by `(metric_id, time)`. Duplicates keep their arrival order.
pub fn sort_points(points: &mut [Point]) {
    points.sort_by_key(Point::key);
}

/// Returns true if `points` is ascending by `(metric_id, time)`.
pub fn is_sorted(points: &[Point]) -> bool {
    points.windows(2).all(|w| w[0].key() <= w[1].key())
}

/// Backing store plus a logical length.
///
/// Compaction only moves the logical length; the slots past it keep stale
/// entries and are never exposed.
#[derive(Debug, Default, Clone)]
pub struct PointBuffer {
    points: Vec<Point>,
    len: usize,
}

impl PointBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        PointBuffer {
            points: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// Appends a point after the live prefix, reusing a stale slot when one is available.
    pub fn push(&mut self, point: Point) {
        if self.len < self.points.len() {
            self.points[self.len] = point;
        } else {
            self.points.push(point);
        }
        self.len += 1;
    }

    /// Returns the number of live points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no live points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.points[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [Point] {
        &mut self.points[..self.len]
    }

    /// Sorts the live prefix by `(metric_id, time)`.
    pub fn sort(&mut self) {
        sort_points(self.as_mut_slice());
    }

    /// Drops tombstones and NaN values. Returns the new length.
    pub fn clean_up(&mut self) -> usize {
        self.len = compact::clean_up(self.as_mut_slice()).len();
        self.len
    }

    /// Collapses duplicate `(metric_id, time)` keys. Returns the new length.
    pub fn uniq(&mut self) -> usize {
        self.len = compact::uniq(self.as_mut_slice()).len();
        self.len
    }

    /// Consumes the buffer, dropping stale slots.
    pub fn into_vec(mut self) -> Vec<Point> {
        self.points.truncate(self.len);
        self.points
    }
}

impl From<Vec<Point>> for PointBuffer {
    fn from(points: Vec<Point>) -> Self {
        let len = points.len();
        PointBuffer { points, len }
    }
}
