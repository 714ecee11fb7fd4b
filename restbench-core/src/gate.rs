use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::CancelToken;

/// Why an index was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refusal {
    Cancelled,
    Deadline,
}

/// Admission check run before an index is enqueued and before an attempt starts.
#[derive(Debug)]
pub(crate) struct AttemptGate {
    cancel: CancelToken,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
}

impl AttemptGate {
    /// A zero `duration` means the iteration bound alone decides.
    pub(crate) fn new(cancel: CancelToken, duration: Duration) -> Self {
        Self {
            cancel,
            duration: (!duration.is_zero()).then_some(duration),
            deadline: OnceLock::new(),
        }
    }

    pub(crate) fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn admit(&self) -> Result<(), Refusal> {
        self.admit_at(Instant::now())
    }

    pub(crate) fn admit_at(&self, now: Instant) -> Result<(), Refusal> {
        if self.cancel.is_cancelled() {
            return Err(Refusal::Cancelled);
        }

        // Unarmed until `start_at`; a zero duration never arms it.
        if let Some(deadline) = self.deadline.get()
            && now >= *deadline
        {
            return Err(Refusal::Deadline);
        }

        Ok(())
    }
}
