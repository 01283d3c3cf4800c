//! Batch sink adapter: chunked bulk writes plus recurring scheduled flushes
//! with a cancellable handle per pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::sink::{Destination, WriteSummary};

/// Destinations cap payload sizes, so a batch is written in sub-batches of
/// at most this many records.
const MAX_SUB_BATCH_SIZE: usize = 500;

type FlushTask = Arc<dyn Fn() -> BoxFuture<'static, Result<WriteSummary>> + Send + Sync>;
type CompleteHook = Arc<dyn Fn(&WriteSummary) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Recurring flush definition: the task to run each tick plus completion and
/// error hooks.
#[derive(Clone)]
pub struct FlushSchedule {
    pub interval: Duration,
    pub task: FlushTask,
    pub on_complete: CompleteHook,
    pub on_error: ErrorHook,
}

impl FlushSchedule {
    pub fn new<T, Fut>(interval: Duration, task: T) -> Self
    where
        T: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<WriteSummary>> + Send + 'static,
    {
        Self {
            interval,
            task: Arc::new(move || Box::pin(task())),
            on_complete: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
        }
    }

    pub fn on_complete<F: Fn(&WriteSummary) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_complete = Arc::new(hook);
        self
    }

    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_error = Arc::new(hook);
        self
    }
}

struct ScheduledFlush {
    token: CancellationToken,
}

/// Writes batches to the [`Destination`] collaborator and manages at most
/// one recurring flush timer per pipeline id.
pub struct BatchSink<D> {
    destination: Arc<D>,
    schedules: Mutex<HashMap<String, ScheduledFlush>>,
}

impl<D> BatchSink<D>
where
    D: Destination + Send + Sync + 'static,
{
    pub fn new(destination: Arc<D>) -> Self {
        Self {
            destination,
            schedules: Mutex::new(HashMap::new()),
        }
    }

    /// Writes all records in fixed-size sub-batches, each write bounded by
    /// `timeout`. The first failing or timed-out sub-batch aborts the call
    /// and propagates the error; sub-batches already written are not rolled
    /// back.
    pub async fn process_batch(
        &self,
        pipeline_id: &str,
        records: &[Record],
        table: &str,
        timeout: Duration,
    ) -> Result<WriteSummary> {
        let mut total = WriteSummary::default();
        for chunk in records.chunks(MAX_SUB_BATCH_SIZE) {
            let summary = tokio::time::timeout(
                timeout,
                self.destination.write(pipeline_id, table, chunk),
            )
            .await
            .map_err(|_| {
                Error::Sink(format!("batch write to {table} timed out after {timeout:?}"))
            })?
            .map_err(|e| Error::Sink(format!("batch write to {table} failed: {e}")))?;
            if summary.failed > 0 {
                return Err(Error::Sink(format!(
                    "batch write to {table}: {} of {} records failed in sub-batch",
                    summary.failed,
                    chunk.len()
                )));
            }
            total.merge(summary);
        }
        debug!(
            pipeline_id,
            table,
            records = total.succeeded,
            "Batch write complete"
        );
        Ok(total)
    }

    /// Starts a recurring flush for the pipeline. Re-scheduling replaces the
    /// existing timer, keeping at most one active timer per pipeline id.
    pub fn schedule_flush(&self, pipeline_id: &str, schedule: FlushSchedule) {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let id = pipeline_id.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(schedule.interval);
            // the first tick of a tokio interval fires immediately; the
            // schedule starts one interval from now
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        info!(pipeline_id = id, "Scheduled flush cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        match (schedule.task)().await {
                            Ok(summary) => (schedule.on_complete)(&summary),
                            Err(err) => {
                                error!(pipeline_id = id, %err, "Scheduled flush failed");
                                (schedule.on_error)(&err);
                            }
                        }
                    }
                }
            }
        });

        if let Some(previous) = self
            .schedules
            .lock()
            .insert(pipeline_id.to_string(), ScheduledFlush { token })
        {
            previous.token.cancel();
        }
    }

    /// Cancels the recurring flush, if any. Idempotent and safe while a
    /// flush is in flight; it stops future triggers without aborting the
    /// in-flight one.
    pub fn cancel_flush(&self, pipeline_id: &str) {
        if let Some(schedule) = self.schedules.lock().remove(pipeline_id) {
            schedule.token.cancel();
        }
    }

    pub fn has_schedule(&self, pipeline_id: &str) -> bool {
        self.schedules.lock().contains_key(pipeline_id)
    }

    /// Cancels every recurring flush. Used on orchestrator shutdown.
    pub fn shutdown(&self) {
        let mut schedules = self.schedules.lock();
        for (_, schedule) in schedules.drain() {
            schedule.token.cancel();
        }
    }
}
