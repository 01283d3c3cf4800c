//! Quarantine collaborator: side storage for records rejected by the quality
//! gate. Quarantining is fire-and-forget; a failure here is logged and never
//! aborts the batch being processed.

use tracing::warn;

use crate::error::Result;
use crate::record::Record;

#[trait_variant::make(Quarantine: Send)]
pub trait LocalQuarantine {
    async fn quarantine(&self, tenant_id: &str, record: Record, reason: &str) -> Result<()>;
}

/// Quarantine that only logs. Rejected records do not re-enter the pipeline
/// and are not durably kept; a durable dead-letter store can be plugged in
/// through the [`Quarantine`] trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogQuarantine;

impl Quarantine for LogQuarantine {
    async fn quarantine(&self, tenant_id: &str, record: Record, reason: &str) -> Result<()> {
        warn!(tenant_id, record = %record, reason, "Record quarantined");
        Ok(())
    }
}
