use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Source Error - {0}")]
    Source(String),

    #[error("Quality Gate Error - {0}")]
    QualityGate(String),

    #[error("Quarantine Error - {0}")]
    Quarantine(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Stream Error - {0}")]
    Stream(String),

    #[error("Streaming Circuit Open - {0}")]
    StreamingCircuitOpen(String),

    #[error("Watermark Error - {0}")]
    Watermark(String),

    #[error("Job Store Error - {0}")]
    JobStore(String),

    #[error("Pipeline Error - {0}")]
    Pipeline(String),
}

impl Error {
    /// Only transient delivery failures are worth a job-level retry. An open
    /// streaming circuit is terminal no matter how much retry budget is left.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Sink(_) | Error::Stream(_))
    }
}
