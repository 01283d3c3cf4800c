//! Per-pipeline configuration, validated at registration. A pipeline never
//! activates with an invalid config; re-registration replaces the stored
//! config but keeps the pipeline's watermark and queue.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 10_000;
const MAX_WATERMARK_DELAY: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_DEDUPLICATION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_SINK_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_WATERMARK_DELAY: Duration = Duration::from_secs(5 * 60);
const DEFAULT_DEDUPLICATION_WINDOW: Duration = Duration::from_secs(10 * 60);
const DEFAULT_MAX_RETRIES: u16 = 3;
const DEFAULT_RETRY_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(30);

/// Kind of source feeding a pipeline. Matched exhaustively wherever a
/// handler is picked, so a new kind cannot be forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Database,
    Api,
    File,
    Stream,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Database => write!(f, "database"),
            SourceType::Api => write!(f, "api"),
            SourceType::File => write!(f, "file"),
            SourceType::Stream => write!(f, "stream"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline_id: String,
    /// Tenant owning the pipeline; scopes quarantine entries.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub source: SourceType,
    /// Destination table for batch writes.
    pub destination: String,
    pub batch_size: usize,
    /// Grace window for late data: records older than
    /// `watermark - watermark_delay` are dropped. Tune per source based on
    /// expected clock skew and network delay.
    pub watermark_delay: Duration,
    pub deduplication_window: Duration,
    pub max_retries: u16,
    pub retry_backoff_base: Duration,
    /// Deadline for each individual sink call (a sub-batch write or a
    /// per-record publish). Expiry surfaces as a retryable sink error, so a
    /// hung collaborator cannot wedge a drain.
    pub sink_timeout: Duration,
    pub enable_streaming: bool,
    pub enable_batch: bool,
}

fn default_tenant() -> String {
    "default".to_string()
}

impl PipelineConfig {
    /// A config with the defaults: batch sink enabled, streaming disabled,
    /// 5m watermark delay, 10m dedup window, 3 retries on a 1s base, 30s
    /// sink timeout.
    pub fn new(
        pipeline_id: impl Into<String>,
        source: SourceType,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            tenant_id: default_tenant(),
            source,
            destination: destination.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            watermark_delay: DEFAULT_WATERMARK_DELAY,
            deduplication_window: DEFAULT_DEDUPLICATION_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_base: DEFAULT_RETRY_BACKOFF_BASE,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            enable_streaming: false,
            enable_batch: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline_id.is_empty() {
            return Err(Error::Config("pipeline_id must not be empty".to_string()));
        }
        if self.destination.is_empty() {
            return Err(Error::Config(format!(
                "destination must not be empty for pipeline {}",
                self.pipeline_id
            )));
        }
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(Error::Config(format!(
                "batch_size {} out of range [{MIN_BATCH_SIZE}, {MAX_BATCH_SIZE}]",
                self.batch_size
            )));
        }
        if self.watermark_delay > MAX_WATERMARK_DELAY {
            return Err(Error::Config(format!(
                "watermark_delay {:?} exceeds 24h",
                self.watermark_delay
            )));
        }
        if self.deduplication_window > MAX_DEDUPLICATION_WINDOW {
            return Err(Error::Config(format!(
                "deduplication_window {:?} exceeds 24h",
                self.deduplication_window
            )));
        }
        if self.sink_timeout.is_zero() || self.sink_timeout > MAX_SINK_TIMEOUT {
            return Err(Error::Config(format!(
                "sink_timeout {:?} out of range (0, 1h]",
                self.sink_timeout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> PipelineConfig {
        PipelineConfig::new("orders", SourceType::Database, "orders_table")
    }

    #[test]
    fn default_config_is_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn empty_pipeline_id_rejected() {
        let mut config = base_config();
        config.pipeline_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_destination_rejected() {
        let mut config = base_config();
        config.destination = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn batch_size_bounds() {
        let mut config = base_config();
        config.batch_size = 0;
        assert!(config.validate().is_err());
        config.batch_size = 1;
        assert!(config.validate().is_ok());
        config.batch_size = 10_000;
        assert!(config.validate().is_ok());
        config.batch_size = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn delay_and_window_capped_at_24h() {
        let mut config = base_config();
        config.watermark_delay = Duration::from_secs(24 * 60 * 60);
        config.deduplication_window = Duration::from_secs(24 * 60 * 60);
        assert!(config.validate().is_ok());

        config.watermark_delay = Duration::from_secs(24 * 60 * 60 + 1);
        assert!(config.validate().is_err());

        config.watermark_delay = Duration::from_secs(60);
        config.deduplication_window = Duration::from_secs(24 * 60 * 60 + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn sink_timeout_bounds() {
        let mut config = base_config();
        config.sink_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.sink_timeout = Duration::from_secs(60 * 60);
        assert!(config.validate().is_ok());
        config.sink_timeout = Duration::from_secs(60 * 60 + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn source_type_serde_round_trip() {
        let json = serde_json::to_string(&SourceType::Database).unwrap();
        assert_eq!(json, "\"database\"");
        let parsed: SourceType = serde_json::from_str("\"stream\"").unwrap();
        assert_eq!(parsed, SourceType::Stream);
    }
}
