//! Interface to the storage-query collaborator that supplies point batches,
//! plus parsers for the plain-text responses the column store returns.

use std::collections::HashSet;

use crate::error::PointError;
use crate::types::{sort_points, MetricId, Point, Time};

/// Supplies points for a range query against the backing store.
///
/// Implementations return points sorted ascending by `(metric_id, time)`
/// covering at least `[from, until]`.
pub trait PointSource: Send + Sync {
    fn fetch(&self, metric_ids: &[MetricId], from: Time, until: Time) -> Result<Vec<Point>, PointError>;
}

/// A point source backed by a vector, for tests and offline rendering.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    points: Vec<Point>,
}

impl InMemorySource {
    pub fn new(mut points: Vec<Point>) -> Self {
        sort_points(&mut points);
        InMemorySource { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl PointSource for InMemorySource {
    fn fetch(&self, metric_ids: &[MetricId], from: Time, until: Time) -> Result<Vec<Point>, PointError> {
        if from > until {
            return Err(PointError::InvalidTimeRange { from, until });
        }
        let wanted: HashSet<MetricId> = metric_ids.iter().copied().collect();
        Ok(self
            .points
            .iter()
            .filter(|p| wanted.contains(&p.metric_id) && p.time >= from && p.time <= until)
            .copied()
            .collect())
    }
}

/// Splits a newline-delimited response body into rows, dropping the empty
/// row left by the trailing newline.
fn split_rows(body: &str) -> Vec<&str> {
    let mut rows: Vec<&str> = body.split('\n').collect();
    if rows.last() == Some(&"") {
        rows.pop();
    }
    rows
}

/// Parses a label listing (`SELECT ... GROUP BY value ORDER BY value`): one
/// value per line.
pub fn parse_label_rows(body: &str) -> Vec<String> {
    split_rows(body).into_iter().map(str::to_string).collect()
}

/// Parses tab-separated `metric_id, time, value, timestamp` rows.
///
/// Line numbers in errors are 1-based.
pub fn parse_point_rows(body: &str) -> Result<Vec<Point>, PointError> {
    split_rows(body)
        .into_iter()
        .enumerate()
        .map(|(i, row)| parse_point_row(i + 1, row))
        .collect()
}

fn parse_point_row(line: usize, row: &str) -> Result<Point, PointError> {
    let mut fields = row.trim_end_matches('\r').split('\t');
    let mut next = |name: &str| {
        fields.next().ok_or_else(|| PointError::Parse {
            line,
            reason: format!("missing {} column", name),
        })
    };
    let metric = next("metric_id")?;
    let time = next("time")?;
    let value = next("value")?;
    let timestamp = next("timestamp")?;
    if fields.next().is_some() {
        return Err(PointError::Parse {
            line,
            reason: "expected 4 columns".to_string(),
        });
    }

    let bad = |name: &str, raw: &str| PointError::Parse {
        line,
        reason: format!("invalid {} {:?}", name, raw),
    };
    Ok(Point {
        metric_id: metric.parse().map_err(|_| bad("metric_id", metric))?,
        time: time.parse().map_err(|_| bad("time", time))?,
        value: parse_value(value).ok_or_else(|| bad("value", value))?,
        timestamp: timestamp.parse().map_err(|_| bad("timestamp", timestamp))?,
    })
}

/// Accepts the column store's spellings of special floats.
fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "nan" | "NaN" | "-nan" => Some(f64::NAN),
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_rows_drops_trailing_empty() {
        assert_eq!(parse_label_rows("dc\nhost\nrole\n"), vec!["dc", "host", "role"]);
        assert_eq!(parse_label_rows("only"), vec!["only"]);
        assert!(parse_label_rows("").is_empty());
        // inner blank rows are values
        assert_eq!(parse_label_rows("a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_parse_point_rows() {
        let body = "1\t60\t1.5\t100\n1\t120\tnan\t101\r\n2\t60\t-inf\t7\n";
        let points = parse_point_rows(body).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], Point::new(1, 60, 1.5, 100));
        assert!(points[1].value.is_nan());
        assert_eq!(points[1].timestamp, 101);
        assert_eq!(points[2].value, f64::NEG_INFINITY);
    }

    #[test]
    fn test_parse_point_rows_errors() {
        match parse_point_rows("1\t60\t1.5\t100\n1\t60\n") {
            Err(PointError::Parse { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("value"), "{}", reason);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(matches!(
            parse_point_rows("x\t60\t1.5\t100"),
            Err(PointError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_point_rows("1\t60\t1.5\t100\textra"),
            Err(PointError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_in_memory_source_filters_and_sorts() {
        let source = InMemorySource::new(vec![
            Point::new(2, 20, 2.0, 1),
            Point::new(1, 30, 3.0, 1),
            Point::new(1, 10, 1.0, 1),
            Point::new(3, 10, 9.0, 1),
            Point::new(1, 99, 9.0, 1),
        ]);
        assert_eq!(source.len(), 5);
        let fetched = source.fetch(&[1, 2], 10, 30).unwrap();
        let keys: Vec<_> = fetched.iter().map(Point::key).collect();
        assert_eq!(keys, vec![(1, 10), (1, 30), (2, 20)]);

        assert!(source.fetch(&[1], 30, 10).is_err());
        assert!(source.fetch(&[], 0, 100).unwrap().is_empty());
    }
}
