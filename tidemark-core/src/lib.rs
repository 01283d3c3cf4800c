/// The orchestrator moves data from the Source intake to the Sinks. A drain
/// of a pipeline's queue executes the following under a tracked job:
/// - Validate every record against the pipeline's quality gate, quarantining
///   rejects
/// - Sort survivors by event time and drop records behind the watermark
/// - Deduplicate within the configured time window
/// - Deliver to the batch and/or streaming sink
/// - Advance the pipeline watermark to the batch's max event time
pub mod pipeline;

mod error;
pub use crate::error::{Error, Result};

pub mod config;
pub mod dedup;
pub mod event_time;
pub mod job;
pub mod quality;
pub mod quarantine;
pub mod record;
pub mod sink;
pub mod source;
pub mod typ;
pub mod watermark;
