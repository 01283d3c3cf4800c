//! Pure event-time functions: ordering, window bucketing, late-record
//! identification, and batch time statistics. No side effects and no failure
//! modes; callers are responsible for supplying records with valid
//! timestamps.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::record::Record;

/// Sorts records ascending by event time. The sort is stable, so records
/// with equal event times keep their input order; this keeps batch
/// processing deterministic.
pub fn sort_by_event_time(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by_key(|record| record.event_time);
    records
}

/// Buckets records into fixed-size, left-aligned time windows keyed by
/// window start. A zero window degenerates to one bucket per distinct event
/// time.
pub fn group_by_time_window(
    records: Vec<Record>,
    window: Duration,
) -> BTreeMap<DateTime<Utc>, Vec<Record>> {
    let window_ms = window.as_millis() as i64;
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<Record>> = BTreeMap::new();
    for record in records {
        let start = if window_ms == 0 {
            record.event_time
        } else {
            let ts = record.event_time.timestamp_millis();
            let aligned = ts - ts.rem_euclid(window_ms);
            DateTime::from_timestamp_millis(aligned).unwrap_or(record.event_time)
        };
        buckets.entry(start).or_default().push(record);
    }
    buckets
}

/// Records whose event time is strictly older than the watermark.
pub fn identify_late_records(records: &[Record], watermark: DateTime<Utc>) -> Vec<Record> {
    records
        .iter()
        .filter(|record| record.event_time < watermark)
        .cloned()
        .collect()
}

/// Batch-level time statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTimeStats {
    pub min_event_time: DateTime<Utc>,
    pub max_event_time: DateTime<Utc>,
}

impl BatchTimeStats {
    pub fn span(&self) -> chrono::Duration {
        self.max_event_time - self.min_event_time
    }
}

/// `None` for an empty batch.
pub fn time_stats(records: &[Record]) -> Option<BatchTimeStats> {
    let min = records.iter().map(|r| r.event_time).min()?;
    let max = records.iter().map(|r| r.event_time).max()?;
    Some(BatchTimeStats {
        min_event_time: min,
        max_event_time: max,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn record_at(id: &str, secs: i64) -> Record {
        Record::new(
            id,
            Utc.timestamp_opt(secs, 0).unwrap(),
            json!({"id": id}),
            "test",
        )
    }

    #[test]
    fn sorts_ascending_by_event_time() {
        let records = vec![record_at("c", 3), record_at("a", 1), record_at("b", 2)];
        let sorted = sort_by_event_time(records);
        let ids: Vec<_> = sorted.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn sort_is_stable_for_equal_timestamps() {
        let records = vec![record_at("first", 5), record_at("second", 5)];
        let sorted = sort_by_event_time(records);
        assert_eq!(sorted[0].id, "first");
        assert_eq!(sorted[1].id, "second");
    }

    #[test]
    fn windows_are_left_aligned() {
        // 60s windows: 0-59 and 60-119
        let records = vec![record_at("a", 10), record_at("b", 59), record_at("c", 61)];
        let buckets = group_by_time_window(records, Duration::from_secs(60));
        assert_eq!(buckets.len(), 2);

        let first = Utc.timestamp_opt(0, 0).unwrap();
        let second = Utc.timestamp_opt(60, 0).unwrap();
        assert_eq!(buckets.get(&first).unwrap().len(), 2);
        assert_eq!(buckets.get(&second).unwrap().len(), 1);
    }

    #[test]
    fn zero_window_buckets_per_event_time() {
        let records = vec![record_at("a", 10), record_at("b", 10), record_at("c", 11)];
        let buckets = group_by_time_window(records, Duration::ZERO);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn late_records_are_strictly_older_than_watermark() {
        let records = vec![record_at("a", 10), record_at("b", 20), record_at("c", 30)];
        let watermark = Utc.timestamp_opt(20, 0).unwrap();
        let late = identify_late_records(&records, watermark);
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].id, "a");
    }

    #[test]
    fn time_stats_over_batch() {
        assert!(time_stats(&[]).is_none());

        let records = vec![record_at("a", 10), record_at("b", 40), record_at("c", 25)];
        let stats = time_stats(&records).unwrap();
        assert_eq!(stats.min_event_time, Utc.timestamp_opt(10, 0).unwrap());
        assert_eq!(stats.max_event_time, Utc.timestamp_opt(40, 0).unwrap());
        assert_eq!(stats.span(), chrono::Duration::seconds(30));
    }
}
