//! Per-pipeline watermark registry. The watermark is the event time below
//! which a pipeline considers all data already seen; it only ever moves
//! forward. Filtering applies a configurable grace delay so slightly-late
//! data still gets through while bounding how long we wait for stragglers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::record::Record;

/// Tracks the latest-known-good event time for every registered pipeline.
/// An explicit registry owned by the orchestrator, shared by handle; updates
/// are atomic per pipeline id.
#[derive(Default)]
pub struct WatermarkTracker {
    watermarks: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl WatermarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes the watermark for a pipeline at the start of time. Keeps
    /// the existing value on re-registration.
    pub fn register(&self, pipeline_id: &str) {
        self.watermarks
            .write()
            .entry(pipeline_id.to_string())
            .or_insert(DateTime::UNIX_EPOCH);
    }

    /// Current watermark; the epoch for pipelines we have never seen.
    pub fn get_watermark(&self, pipeline_id: &str) -> DateTime<Utc> {
        self.watermarks
            .read()
            .get(pipeline_id)
            .copied()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Advances the watermark to `candidate` if it is newer; a stale
    /// candidate is a silent no-op, so the watermark never rolls back.
    pub fn update_watermark(&self, pipeline_id: &str, candidate: DateTime<Utc>) {
        let mut watermarks = self.watermarks.write();
        let current = watermarks
            .entry(pipeline_id.to_string())
            .or_insert(DateTime::UNIX_EPOCH);
        if candidate > *current {
            debug!(pipeline_id, watermark = %candidate, "Advancing watermark");
            *current = candidate;
        }
    }

    /// Keeps records with `event_time >= watermark - delay`; the rest are
    /// late-arriving and get dropped after logging, never queued for retry.
    pub fn apply_watermark(
        &self,
        pipeline_id: &str,
        records: Vec<Record>,
        delay: Duration,
    ) -> Vec<Record> {
        let watermark = self.get_watermark(pipeline_id);
        // delay is capped at 24h by config validation, safely within range
        let delay = chrono::Duration::from_std(delay).unwrap_or_default();
        let threshold = watermark - delay;

        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if record.event_time >= threshold {
                kept.push(record);
            } else {
                warn!(
                    pipeline_id,
                    record = %record,
                    %threshold,
                    "Dropping late-arriving record"
                );
            }
        }
        kept
    }
}
