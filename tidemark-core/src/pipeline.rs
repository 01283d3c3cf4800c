//! The pipeline orchestrator owns per-pipeline configuration, the volatile
//! processing queue, job lifecycle, and runs the stages in a fixed order for
//! every batch drain:
//!
//! ```text
//! (intake) --> [queue] --> (quality gate) --> (sort) --> (watermark filter)
//!                              |                              |
//!                              v                              v
//!                         {quarantine}                     (dedup)
//!                                                             |
//!                                            +----------------+---------------+
//!                                            v                                v
//!                                       (batch sink)                  (streaming sink)
//!                                            \                                /
//!                                             +--> watermark advance <-------+
//! ```
//!
//! Within one drain the stages run strictly in this order; different
//! pipelines drain concurrently with no ordering guarantee between them. A
//! second flush trigger while a drain is in flight on the same pipeline is
//! coalesced, so at most one drain runs per pipeline at a time.
//!
//! A drain of a non-empty queue runs under a [`Job`] whose lifecycle is
//! `pending -> running -> {completed | failed | retrying}` with
//! `retrying -> running` after an exponential backoff delay
//! (`retry_backoff_base * 2^(retry_count - 1)`), capped by `max_retries`.
//! Only sink and stream failures are retried; an open streaming circuit
//! fails the job immediately, whatever budget is left.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::strategy::exponential::Exponential;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::dedup;
use crate::error::{Error, Result};
use crate::event_time;
use crate::job::{Job, JobStatus, JobStore};
use crate::quality::{GateSpec, QualityGate, QualityMetrics};
use crate::record::Record;
use crate::sink::batch::BatchSink;
use crate::sink::stream::StreamingSink;
use crate::source::SourceReader;
use crate::typ::TidemarkTypeConfig;
use crate::watermark::WatermarkTracker;

/// A record younger than this triggers an immediate flush so low-latency
/// data is not held hostage by a slow-filling queue.
const FRESHNESS_THRESHOLD_SECS: i64 = 60;
/// The periodic drain bounds worst-case latency for low-traffic pipelines.
const BACKGROUND_DRAIN_INTERVAL: Duration = Duration::from_secs(30);
const JOB_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Terminal jobs older than this are dropped from in-memory tracking; the
/// persisted job history outlives them.
const JOB_RETENTION_HOURS: i64 = 24;
/// Cumulative streaming errors per job before the circuit opens.
const MAX_STREAMING_ERRORS: u32 = 10;

struct PipelineState {
    config: RwLock<PipelineConfig>,
    /// Volatile; not replayed after a crash. Job metadata is what gets
    /// persisted, not in-flight records.
    queue: Mutex<Vec<Record>>,
    /// Serializes drains for this pipeline; a trigger that cannot take the
    /// lock is coalesced.
    drain: tokio::sync::Mutex<()>,
    /// Streaming error counter for the current job.
    streaming_errors: AtomicU32,
}

impl PipelineState {
    fn new(config: PipelineConfig) -> Self {
        Self {
            config: RwLock::new(config),
            queue: Mutex::new(Vec::new()),
            drain: tokio::sync::Mutex::new(()),
            streaming_errors: AtomicU32::new(0),
        }
    }
}

/// Coordinates intake, validation, temporal ordering, dedup, and delivery
/// for every registered pipeline. Cheap to clone; clones share state.
pub struct PipelineOrchestrator<C: TidemarkTypeConfig> {
    pipelines: Arc<RwLock<HashMap<String, Arc<PipelineState>>>>,
    /// In-memory job tracking, purged on a retention horizon.
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    quality_gate: Arc<QualityGate<C::Quarantine>>,
    watermarks: Arc<WatermarkTracker>,
    batch_sink: Arc<BatchSink<C::Destination>>,
    streaming_sink: Arc<StreamingSink<C::StreamPublisher>>,
    job_store: Arc<C::JobStore>,
    shutdown: CancellationToken,
}

impl<C: TidemarkTypeConfig> Clone for PipelineOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            pipelines: Arc::clone(&self.pipelines),
            jobs: Arc::clone(&self.jobs),
            quality_gate: Arc::clone(&self.quality_gate),
            watermarks: Arc::clone(&self.watermarks),
            batch_sink: Arc::clone(&self.batch_sink),
            streaming_sink: Arc::clone(&self.streaming_sink),
            job_store: Arc::clone(&self.job_store),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<C: TidemarkTypeConfig> PipelineOrchestrator<C> {
    pub fn new(
        gates: HashMap<String, GateSpec>,
        job_store: Arc<C::JobStore>,
        destination: Arc<C::Destination>,
        stream_publisher: Arc<C::StreamPublisher>,
        quarantine: Arc<C::Quarantine>,
    ) -> Self {
        let metrics = Arc::new(QualityMetrics::new());
        Self {
            pipelines: Arc::new(RwLock::new(HashMap::new())),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            quality_gate: Arc::new(QualityGate::new(gates, metrics, quarantine)),
            watermarks: Arc::new(WatermarkTracker::new()),
            batch_sink: Arc::new(BatchSink::new(destination)),
            streaming_sink: Arc::new(StreamingSink::new(stream_publisher)),
            job_store,
            shutdown: CancellationToken::new(),
        }
    }

    /// Validates and registers a pipeline, initializing its watermark and
    /// queue. Re-registration replaces the config but keeps the existing
    /// watermark and queue.
    pub fn register_pipeline(&self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        let pipeline_id = config.pipeline_id.clone();
        self.watermarks.register(&pipeline_id);

        let mut pipelines = self.pipelines.write();
        match pipelines.get(&pipeline_id) {
            Some(state) => {
                info!(pipeline_id, "Re-registering pipeline, replacing config");
                *state.config.write() = config;
            }
            None => {
                pipelines.insert(pipeline_id.clone(), Arc::new(PipelineState::new(config)));
                info!(pipeline_id, "Registered pipeline");
            }
        }
        Ok(())
    }

    /// Appends a record to the pipeline's queue and triggers an immediate
    /// drain when the queue has reached the batch size or the record is
    /// fresh. The drain runs on a spawned task; a trigger racing an
    /// in-flight drain is coalesced.
    pub fn process_record(&self, pipeline_id: &str, record: Record) -> Result<()> {
        let state = self.pipeline_state(pipeline_id)?;
        let fresh = record.age() < chrono::Duration::seconds(FRESHNESS_THRESHOLD_SECS);
        let queue_len = {
            let mut queue = state.queue.lock();
            queue.push(record);
            queue.len()
        };
        let batch_size = state.config.read().batch_size;
        if queue_len >= batch_size || fresh {
            self.spawn_drain(pipeline_id);
        }
        Ok(())
    }

    /// Pulls one batch from the ingestion collaborator into the queue.
    pub async fn ingest_batch<R: SourceReader>(
        &self,
        pipeline_id: &str,
        reader: &mut R,
    ) -> Result<usize> {
        let batch_size = self.pipeline_state(pipeline_id)?.config.read().batch_size;
        let records = reader.read_batch(batch_size).await?;
        let count = records.len();
        for record in records {
            self.process_record(pipeline_id, record)?;
        }
        Ok(count)
    }

    /// Drains the pipeline's queue under a new [`Job`], retrying sink
    /// failures on the backoff ladder. Returns `None` when there was
    /// nothing to do or another drain was already in flight.
    pub async fn drain_pipeline(&self, pipeline_id: &str) -> Result<Option<Job>> {
        let state = self.pipeline_state(pipeline_id)?;
        let Ok(_guard) = state.drain.try_lock() else {
            debug!(pipeline_id, "Drain already in flight, coalescing trigger");
            return Ok(None);
        };

        // Snapshot and clear the queue up front: retries re-process the
        // snapshot, new arrivals accumulate for the next drain, and a batch
        // that gates down to nothing cannot loop.
        let records: Vec<Record> = {
            let mut queue = state.queue.lock();
            std::mem::take(&mut *queue)
        };
        if records.is_empty() {
            return Ok(None);
        }
        let config = state.config.read().clone();

        let job = Job::new(pipeline_id, self.watermarks.get_watermark(pipeline_id));
        let job_id = job.id.clone();
        self.jobs.lock().insert(job_id.clone(), job.clone());
        if let Err(err) = self.job_store.save_job(&job).await {
            error!(pipeline_id, %err, "Failed to persist new job");
        }
        state.streaming_errors.store(0, Ordering::SeqCst);

        let ladder = Exponential::doubling(config.retry_backoff_base, config.max_retries);
        let operation = {
            let orch = self.clone();
            let state = Arc::clone(&state);
            let records = records.clone();
            let config = config.clone();
            let job_id = job_id.clone();
            move || {
                let orch = orch.clone();
                let state = Arc::clone(&state);
                let records = records.clone();
                let config = config.clone();
                let job_id = job_id.clone();
                async move { orch.run_attempt(&state, &config, &records, &job_id).await }
            }
        };

        match backoff::retry(ladder, operation, Error::is_retryable).await {
            Ok(()) => {
                self.transition(&job_id, JobStatus::Completed, None).await;
                let completed = self.persist_final(&job_id).await;
                Ok(completed)
            }
            Err(err) => {
                error!(pipeline_id, job_id, %err, "Pipeline job failed terminally");
                self.transition(&job_id, JobStatus::Failed, Some(err.to_string()))
                    .await;
                self.persist_final(&job_id).await;
                Err(err)
            }
        }
    }

    /// One run of the batch through the stage order, with the job status
    /// bookkeeping around it.
    async fn run_attempt(
        &self,
        state: &Arc<PipelineState>,
        config: &PipelineConfig,
        records: &[Record],
        job_id: &str,
    ) -> Result<()> {
        self.transition(job_id, JobStatus::Running, None).await;
        match self.process_batch(state, config, records, job_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.is_retryable() {
                    let budget_left = {
                        let mut jobs = self.jobs.lock();
                        match jobs.get_mut(job_id) {
                            Some(job) if job.retry_count < config.max_retries => {
                                job.retry_count += 1;
                                true
                            }
                            _ => false,
                        }
                    };
                    if budget_left {
                        warn!(
                            pipeline_id = config.pipeline_id,
                            job_id,
                            %err,
                            "Batch failed, scheduling retry"
                        );
                        self.transition(job_id, JobStatus::Retrying, Some(err.to_string()))
                            .await;
                    }
                }
                Err(err)
            }
        }
    }

    /// The fixed stage order: gate -> sort -> watermark filter -> dedup ->
    /// sinks -> watermark advance. Gate rejections never abort the batch;
    /// a failure in any later stage fails the whole batch.
    async fn process_batch(
        &self,
        state: &Arc<PipelineState>,
        config: &PipelineConfig,
        records: &[Record],
        job_id: &str,
    ) -> Result<()> {
        let pipeline_id = config.pipeline_id.as_str();

        let mut valid = Vec::with_capacity(records.len());
        let mut rejected = 0u64;
        for record in records {
            let result = self
                .quality_gate
                .validate_record(&config.tenant_id, pipeline_id, record)
                .await;
            if result.passed {
                valid.push(record.clone());
            } else {
                rejected += 1;
            }
        }
        self.update_job(job_id, |job| job.records_failed = rejected);

        let sorted = event_time::sort_by_event_time(valid);
        let on_time = self
            .watermarks
            .apply_watermark(pipeline_id, sorted, config.watermark_delay);
        let unique = dedup::deduplicate(on_time, config.deduplication_window);

        if unique.is_empty() {
            debug!(pipeline_id, job_id, "Nothing left to deliver after gating");
            return Ok(());
        }

        if config.enable_batch {
            self.batch_sink
                .process_batch(pipeline_id, &unique, &config.destination, config.sink_timeout)
                .await?;
        }
        if config.enable_streaming {
            let delivery = self
                .streaming_sink
                .process_records(pipeline_id, &unique, config.sink_timeout)
                .await?;
            if delivery.failed > 0 {
                let total = state
                    .streaming_errors
                    .fetch_add(delivery.failed as u32, Ordering::SeqCst)
                    + delivery.failed as u32;
                if total >= MAX_STREAMING_ERRORS {
                    return Err(Error::StreamingCircuitOpen(format!(
                        "{total} streaming errors for pipeline {pipeline_id}"
                    )));
                }
            }
        }

        if let Some(stats) = event_time::time_stats(&unique) {
            self.watermarks
                .update_watermark(pipeline_id, stats.max_event_time);
        }
        self.update_job(job_id, |job| job.records_processed = unique.len() as u64);
        info!(
            pipeline_id,
            job_id,
            delivered = unique.len(),
            rejected,
            "Batch drain complete"
        );
        Ok(())
    }

    /// Starts the background tasks: the periodic drain across all pipelines
    /// and the hourly purge of old in-memory job records. Both stop on
    /// [`Self::shutdown`].
    pub fn start(&self) {
        let orch = self.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(BACKGROUND_DRAIN_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let ids: Vec<String> = orch.pipelines.read().keys().cloned().collect();
                        for id in ids {
                            orch.spawn_drain(&id);
                        }
                    }
                }
            }
        });

        let orch = self.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(JOB_PURGE_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => orch.purge_jobs(),
                }
            }
        });
    }

    /// Cancels background tasks and recurring flush timers. In-flight
    /// drains are not aborted.
    pub fn shutdown(&self) {
        info!("Shutting down pipeline orchestrator");
        self.shutdown.cancel();
        self.batch_sink.shutdown();
    }

    fn spawn_drain(&self, pipeline_id: &str) {
        let orch = self.clone();
        let id = pipeline_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = orch.drain_pipeline(&id).await {
                error!(pipeline_id = id, %err, "Pipeline drain failed");
            }
        });
    }

    fn purge_jobs(&self) {
        let horizon = Utc::now() - chrono::Duration::hours(JOB_RETENTION_HOURS);
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| match job.end_time {
            Some(end) => !job.status.is_terminal() || end > horizon,
            None => true,
        });
        let purged = before - jobs.len();
        if purged > 0 {
            info!(purged, "Purged old jobs from in-memory tracking");
        }
    }

    /// Updates the in-memory job and persists the transition; a persistence
    /// failure is logged, never escalated.
    async fn transition(&self, job_id: &str, status: JobStatus, error: Option<String>) {
        {
            let mut jobs = self.jobs.lock();
            if let Some(job) = jobs.get_mut(job_id) {
                job.status = status;
                if status.is_terminal() {
                    job.end_time = Some(Utc::now());
                }
                if error.is_some() {
                    job.error = error.clone();
                }
            }
        }
        if let Err(err) = self.job_store.update_job_status(job_id, status, error).await {
            error!(job_id, %err, "Failed to persist job status transition");
        }
    }

    /// Persists the finished job with its final counters.
    async fn persist_final(&self, job_id: &str) -> Option<Job> {
        let job = self.jobs.lock().get(job_id).cloned()?;
        if let Err(err) = self.job_store.save_job(&job).await {
            error!(job_id, %err, "Failed to persist finished job");
        }
        Some(job)
    }

    fn update_job<F: FnOnce(&mut Job)>(&self, job_id: &str, f: F) {
        if let Some(job) = self.jobs.lock().get_mut(job_id) {
            f(job);
        }
    }

    fn pipeline_state(&self, pipeline_id: &str) -> Result<Arc<PipelineState>> {
        self.pipelines
            .read()
            .get(pipeline_id)
            .map(Arc::clone)
            .ok_or_else(|| Error::Pipeline(format!("unknown pipeline {pipeline_id}")))
    }

    pub fn pipeline_config(&self, pipeline_id: &str) -> Option<PipelineConfig> {
        self.pipelines
            .read()
            .get(pipeline_id)
            .map(|state| state.config.read().clone())
    }

    pub fn queue_len(&self, pipeline_id: &str) -> usize {
        self.pipelines
            .read()
            .get(pipeline_id)
            .map_or(0, |state| state.queue.lock().len())
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().get(job_id).cloned()
    }

    pub fn jobs_for_pipeline(&self, pipeline_id: &str) -> Vec<Job> {
        self.jobs
            .lock()
            .values()
            .filter(|job| job.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }

    pub fn watermark(&self, pipeline_id: &str) -> DateTime<Utc> {
        self.watermarks.get_watermark(pipeline_id)
    }

    pub fn watermarks(&self) -> Arc<WatermarkTracker> {
        Arc::clone(&self.watermarks)
    }

    pub fn quality_metrics(&self) -> Arc<QualityMetrics> {
        self.quality_gate.metrics()
    }

    pub fn batch_sink(&self) -> Arc<BatchSink<C::Destination>> {
        Arc::clone(&self.batch_sink)
    }

    pub fn streaming_sink(&self) -> Arc<StreamingSink<C::StreamPublisher>> {
        Arc::clone(&self.streaming_sink)
    }
}
