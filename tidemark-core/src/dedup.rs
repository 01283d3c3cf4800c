//! Windowed deduplication. Two records are duplicates when they share a
//! dedup key and their event times fall within the window of each other.
//! The input is expected to be sorted by event time (the event-time
//! processor runs first), so keep-first means keeping the earliest
//! occurrence.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::record::Record;

/// Drops duplicates arriving within `window` of the first-kept occurrence of
/// the same key. Deterministic for identical input ordering: the anchor for
/// each key is the first record kept, and a record beyond the window from
/// its anchor starts a new anchor.
pub fn deduplicate(records: Vec<Record>, window: Duration) -> Vec<Record> {
    // window is capped at 24h by config validation, safely within range
    let window = chrono::Duration::from_std(window).unwrap_or_default();
    let mut kept_at: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut unique = Vec::with_capacity(records.len());

    for record in records {
        let key = record.dedup_key();
        match kept_at.get(&key) {
            Some(&anchor) if record.event_time - anchor <= window => {
                debug!(record = %record, %anchor, "Dropping duplicate record");
            }
            _ => {
                kept_at.insert(key, record.event_time);
                unique.push(record);
            }
        }
    }
    unique
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
    fn earlier_duplicate_survives() {
        // A@t0 and A'@t0+1m with a 5-minute window: exactly one survives,
        // and it is the earlier one.
        let t0 = 1_000;
        let records = vec![record_at("A", t0), record_at("A", t0 + 60)];
        let unique = deduplicate(records, Duration::from_secs(5 * 60));
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].event_time, Utc.timestamp_opt(t0, 0).unwrap());
    }

    #[test]
    fn same_key_outside_window_is_kept() {
        let records = vec![record_at("A", 0), record_at("A", 400)];
        let unique = deduplicate(records, Duration::from_secs(300));
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn anchor_does_not_slide() {
        // 0 anchors; 240 is a duplicate of 0; 360 is beyond the window from
        // the anchor and starts a new one.
        let records = vec![record_at("A", 0), record_at("A", 240), record_at("A", 360)];
        let unique = deduplicate(records, Duration::from_secs(300));
        let times: Vec<_> = unique.iter().map(|r| r.event_time.timestamp()).collect();
        assert_eq!(times, vec![0, 360]);
    }

    #[test]
    fn distinct_keys_are_untouched() {
        let records = vec![record_at("A", 0), record_at("B", 0), record_at("C", 1)];
        let unique = deduplicate(records, Duration::from_secs(300));
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn idless_records_dedup_by_content() {
        let t = Utc.timestamp_opt(0, 0).unwrap();
        let a = Record::new("", t, json!({"v": 1}), "s");
        let mut a_dup = Record::new("", t + chrono::Duration::seconds(30), json!({"v": 1}), "s");
        a_dup.processing_time = a.processing_time;
        let b = Record::new("", t, json!({"v": 2}), "s");

        let unique = deduplicate(vec![a, a_dup, b], Duration::from_secs(300));
        assert_eq!(unique.len(), 2);
    }
}
