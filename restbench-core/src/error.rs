pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to spawn worker thread: {0}")]
    SpawnWorker(std::io::Error),

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`iterations` must be at most {max} for a latency profile (got {got})")]
    TooManyIterations { got: u64, max: u64 },

    #[error("`buckets` must be between 1 and {max} (got {got})")]
    InvalidBucketCount { got: usize, max: usize },

    #[error("`duration` must be a positive duration for a load window")]
    InvalidWindowDuration,
}

/// Outcome failure recorded on an [`crate::IterationRecord`].
///
/// These never escape the pool as `Err`; they are counted by the collector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IterationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("work unit panicked: {0}")]
    Panicked(String),
}

impl IterationError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(msg)
    }
}
