//! Streaming sink adapter: named stream registry with per-record,
//! best-effort delivery. A failed record is logged and reported through the
//! error hook without aborting the rest of the batch; each record is
//! published at most once per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::sink::StreamPublisher;

type RecordHook = Arc<dyn Fn(&Record) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&Record, &Error) + Send + Sync>;

/// Registration for one pipeline's stream.
#[derive(Clone)]
pub struct StreamingConfig {
    pub stream_name: String,
    pub on_record_processed: Option<RecordHook>,
    pub on_error: Option<ErrorHook>,
}

impl StreamingConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            on_record_processed: None,
            on_error: None,
        }
    }

    pub fn on_record_processed<F: Fn(&Record) + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.on_record_processed = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F: Fn(&Record, &Error) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

/// Delivered/failed counts for one `process_records` call; the orchestrator
/// feeds the failed count into its streaming circuit breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamDelivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Pushes records one at a time to the streaming collaborator for pipelines
/// with a registered stream.
pub struct StreamingSink<P> {
    publisher: Arc<P>,
    streams: RwLock<HashMap<String, StreamingConfig>>,
}

impl<P> StreamingSink<P>
where
    P: StreamPublisher + Send + Sync + 'static,
{
    pub fn new(publisher: Arc<P>) -> Self {
        Self {
            publisher,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the pipeline's stream. Registering again replaces the
    /// previous registration.
    pub fn start_streaming(&self, pipeline_id: &str, config: StreamingConfig) {
        info!(pipeline_id, stream = config.stream_name, "Starting streaming");
        if self
            .streams
            .write()
            .insert(pipeline_id.to_string(), config)
            .is_some()
        {
            warn!(pipeline_id, "Replaced an existing stream registration");
        }
    }

    /// Deregisters the pipeline's stream. Idempotent; an in-flight
    /// `process_records` call finishes with the config it started with.
    pub fn stop_streaming(&self, pipeline_id: &str) {
        if self.streams.write().remove(pipeline_id).is_some() {
            info!(pipeline_id, "Stopped streaming");
        }
    }

    pub fn is_active(&self, pipeline_id: &str) -> bool {
        self.streams.read().contains_key(pipeline_id)
    }

    /// Publishes records one at a time, each publish bounded by `timeout`,
    /// invoking `on_record_processed` per success. Per-record failures and
    /// timeouts are logged and passed to `on_error` without aborting the
    /// batch.
    pub async fn process_records(
        &self,
        pipeline_id: &str,
        records: &[Record],
        timeout: Duration,
    ) -> Result<StreamDelivery> {
        let config = self
            .streams
            .read()
            .get(pipeline_id)
            .cloned()
            .ok_or_else(|| {
                Error::Stream(format!("no active stream for pipeline {pipeline_id}"))
            })?;

        let mut delivery = StreamDelivery::default();
        for record in records {
            let outcome = match tokio::time::timeout(
                timeout,
                self.publisher.publish(&config.stream_name, record),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Stream(format!(
                    "publish to {} timed out after {timeout:?}",
                    config.stream_name
                ))),
            };
            match outcome {
                Ok(()) => {
                    delivery.delivered += 1;
                    if let Some(hook) = &config.on_record_processed {
                        hook(record);
                    }
                }
                Err(err) => {
                    warn!(
                        pipeline_id,
                        record = %record,
                        %err,
                        "Streaming publish failed for record"
                    );
                    delivery.failed += 1;
                    if let Some(hook) = &config.on_error {
                        hook(record, &err);
                    }
                }
            }
        }
        debug!(
            pipeline_id,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Streaming batch done"
        );
        Ok(delivery)
    }
}
