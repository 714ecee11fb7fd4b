use std::time::{Duration, Instant};

use crate::IterationError;

/// Per-attempt handle created by [`crate::Collector::start_iteration`] and handed back
/// to [`crate::Collector::finalize_iteration`] once the attempt is over.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    index: u64,
    started: Instant,
    ended: Option<Instant>,
    error: Option<IterationError>,
}

impl IterationRecord {
    #[must_use]
    pub fn new(index: u64, started: Instant) -> Self {
        Self {
            index,
            started,
            ended: None,
            error: None,
        }
    }

    pub fn end_iteration(&mut self, error: Option<IterationError>) {
        self.end_iteration_at(Instant::now(), error);
    }

    pub fn end_iteration_at(&mut self, ended: Instant, error: Option<IterationError>) {
        self.ended = Some(ended);
        self.error = error;
    }

    /// Marks an attempt that completed at the transport level as failed.
    pub fn update_error(&mut self, error: IterationError) {
        self.error = Some(error);
    }

    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[must_use]
    pub fn started(&self) -> Instant {
        self.started
    }

    /// End timestamp; falls back to the start when the attempt was never ended.
    #[must_use]
    pub fn ended(&self) -> Instant {
        self.ended.unwrap_or(self.started)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.ended().saturating_duration_since(self.started)
    }

    #[must_use]
    pub fn error(&self) -> Option<&IterationError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
