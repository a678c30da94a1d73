//! In-place compaction and deduplication of point sequences.

use crate::types::{Point, TOMBSTONE};

/// Removes tombstoned points and points without a value.
///
/// Meant to run after dedup/merge passes that mark entries for removal. Kept
/// points retain their relative order. The returned slice is a prefix of
/// `points`; entries past it are left stale.
pub fn clean_up(points: &mut [Point]) -> &mut [Point] {
    let len = points.len();
    let mut squashed = 0;

    for i in 0..len {
        if points[i].is_tombstone() || points[i].value.is_nan() {
            squashed += 1;
            continue;
        }
        if squashed > 0 {
            points[i - squashed] = points[i];
        }
    }

    &mut points[..len - squashed]
}

/// Collapses points sharing `(metric_id, time)` into one, then compacts.
///
/// `points` must be sorted by `(metric_id, time)`. Within a run the point with
/// the greatest `timestamp` survives; every later candidate is compared
/// against the run anchor only, and ties keep the anchor.
pub fn uniq(points: &mut [Point]) -> &mut [Point] {
    // n: first record of the current key run
    let mut n = 0;

    for i in 1..points.len() {
        if points[i].key() != points[n].key() {
            n = i;
            continue;
        }

        if points[i].timestamp > points[n].timestamp {
            points[n] = points[i];
        }

        points[i].metric_id = TOMBSTONE;
    }

    clean_up(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(metric_id: u32, time: u32, value: f64, timestamp: u32) -> Point {
        Point::new(metric_id, time, value, timestamp)
    }

    #[test]
    fn test_clean_up_drops_tombstones_and_nan() {
        let mut points = vec![
            p(1, 10, 1.0, 1),
            p(0, 20, 2.0, 1),
            p(1, 30, f64::NAN, 1),
            p(2, 40, 4.0, 1),
            p(0, 50, 5.0, 1),
            p(2, 60, 6.0, 1),
        ];
        let kept = clean_up(&mut points);
        assert_eq!(kept, &[p(1, 10, 1.0, 1), p(2, 40, 4.0, 1), p(2, 60, 6.0, 1)]);
    }

    #[test]
    fn test_clean_up_is_idempotent() {
        let mut points = vec![p(0, 1, 1.0, 1), p(3, 2, 2.0, 1), p(3, 3, f64::NAN, 1), p(3, 4, 4.0, 1)];
        let once: Vec<Point> = clean_up(&mut points).to_vec();
        let mut again = once.clone();
        assert_eq!(clean_up(&mut again), once.as_slice());
    }

    #[test]
    fn test_clean_up_edge_cases() {
        let mut empty: Vec<Point> = Vec::new();
        assert!(clean_up(&mut empty).is_empty());

        let mut all_removed = vec![p(0, 1, 1.0, 1), p(1, 2, f64::NAN, 1)];
        assert!(clean_up(&mut all_removed).is_empty());

        let mut untouched = vec![p(1, 1, 1.0, 1), p(1, 2, 2.0, 1)];
        assert_eq!(clean_up(&mut untouched).len(), 2);
    }

    #[test]
    fn test_uniq_later_write_wins() {
        let mut points = vec![p(1, 5, 10.0, 1), p(1, 5, 20.0, 2)];
        assert_eq!(uniq(&mut points), &[p(1, 5, 20.0, 2)]);
    }

    #[test]
    fn test_uniq_keeps_anchor_on_equal_timestamp() {
        let mut points = vec![p(1, 5, 10.0, 3), p(1, 5, 20.0, 3), p(1, 5, 30.0, 1)];
        assert_eq!(uniq(&mut points), &[p(1, 5, 10.0, 3)]);
    }

    #[test]
    fn test_uniq_runs_across_metrics() {
        let mut points = vec![
            p(1, 10, 1.0, 1),
            p(1, 10, 1.5, 4),
            p(1, 20, 2.0, 1),
            p(2, 10, 3.0, 9),
            p(2, 10, 3.5, 2),
            p(2, 20, 4.0, 1),
            p(2, 20, 4.5, 2),
            p(2, 20, 4.7, 3),
        ];
        let out = uniq(&mut points);
        assert_eq!(
            out,
            &[p(1, 10, 1.5, 4), p(1, 20, 2.0, 1), p(2, 10, 3.0, 9), p(2, 20, 4.7, 3)]
        );
    }

    #[test]
    fn test_uniq_also_cleans_existing_garbage() {
        let mut points = vec![p(1, 10, f64::NAN, 1), p(1, 20, 2.0, 1), p(1, 20, 2.5, 0)];
        assert_eq!(uniq(&mut points), &[p(1, 20, 2.0, 1)]);

        let mut single = vec![p(7, 1, 1.0, 1)];
        assert_eq!(uniq(&mut single).len(), 1);
    }
}
