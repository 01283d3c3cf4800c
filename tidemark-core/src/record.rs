//! Record is the unit of data that flows through the pipeline, from ingestion
//! through the quality gate, event-time ordering, watermark filtering, dedup,
//! and finally the sinks. It is immutable once created and moves by value
//! through every stage.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A time-stamped record from one of the ingestion sources.
///
/// `event_time` is when the fact occurred in the source domain;
/// `processing_time` is when we ingested it. The two can differ wildly for
/// out-of-order or late-arriving data, which is the whole reason the
/// watermark machinery exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Source-assigned id; may be empty, in which case dedup falls back to a
    /// content fingerprint.
    pub id: String,
    /// When the fact occurred.
    pub event_time: DateTime<Utc>,
    /// When the record was ingested.
    pub processing_time: DateTime<Utc>,
    /// Opaque payload; the quality gate inspects it as JSON.
    pub data: Value,
    /// Identifier of the source that produced the record.
    pub source: String,
    pub partition_key: Option<String>,
    pub sequence_number: Option<i64>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        event_time: DateTime<Utc>,
        data: Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            event_time,
            processing_time: Utc::now(),
            data,
            source: source.into(),
            partition_key: None,
            sequence_number: None,
        }
    }

    /// Key used by the deduplicator. The record id when present, otherwise a
    /// fingerprint over source and payload so id-less records can still be
    /// matched against each other.
    pub fn dedup_key(&self) -> String {
        if !self.id.is_empty() {
            return self.id.clone();
        }
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.source.hash(&mut hasher);
        self.data.to_string().hash(&mut hasher);
        format!("fp-{:016x}", hasher.finish())
    }

    /// How long ago the record was ingested. Used by the orchestrator's
    /// freshness heuristic for eager flushing.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.processing_time
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} from {}",
            if self.id.is_empty() { "<no-id>" } else { &self.id },
            self.event_time.to_rfc3339(),
            self.source,
        )
    }
}
