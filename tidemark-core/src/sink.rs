//! Sinks: the delivery side of the pipeline. The [`Destination`] trait is
//! the external storage collaborator (bulk insert into a named table); the
//! [`batch::BatchSink`] and [`stream::StreamingSink`] adapters sit between
//! the orchestrator and the collaborators.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::Record;

pub mod batch;
pub mod stream;

/// Per-call success/failure counts reported by a destination write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl WriteSummary {
    pub fn merge(&mut self, other: WriteSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Destination storage collaborator: accepts a bulk insert and either
/// succeeds or reports a partial/total failure through the summary or an
/// error.
#[trait_variant::make(Destination: Send)]
pub trait LocalDestination {
    async fn write(
        &self,
        pipeline_id: &str,
        table: &str,
        records: &[Record],
    ) -> Result<WriteSummary>;
}

/// Streaming channel collaborator: publishes one record to a named stream.
#[trait_variant::make(StreamPublisher: Send)]
pub trait LocalStreamPublisher {
    async fn publish(&self, stream_name: &str, record: &Record) -> Result<()>;
}
