//! Ingestion collaborator interface. The concrete readers (database, API,
//! file, stream) live outside this crate; the orchestrator only needs an
//! async batch reader plus a validity check on the source descriptor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::SourceType;
use crate::error::{Error, Result};
use crate::record::Record;

/// What to read and from where. `filters` carries the source-specific
/// selection, keyed by well-known names checked per source kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_type: SourceType,
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl SourceDescriptor {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            filters: HashMap::new(),
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Each source kind requires its own selector; the match is exhaustive
    /// so adding a kind forces a decision here.
    pub fn validate(&self) -> Result<()> {
        let required = match self.source_type {
            SourceType::Database => "table",
            SourceType::Api => "endpoint",
            SourceType::File => "path",
            SourceType::Stream => "topic",
        };
        if self.filters.get(required).is_none_or(|v| v.is_empty()) {
            return Err(Error::Source(format!(
                "{} source requires a non-empty '{required}' filter",
                self.source_type
            )));
        }
        Ok(())
    }
}

/// Async reader yielding batches of records; an empty batch means the
/// source is drained for now.
#[trait_variant::make(SourceReader: Send)]
pub trait LocalSourceReader {
    async fn read_batch(&mut self, max_records: usize) -> Result<Vec<Record>>;
}
