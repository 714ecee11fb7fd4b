use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::IterationRecord;

/// Statistics sink driven by the worker pool.
///
/// Methods take `&self`: workers call `start_iteration`/`finalize_iteration`
/// concurrently, so implementations own their synchronization.
pub trait Collector: Send + Sync {
    /// Called once, right before the timed phase begins.
    fn start(&self);

    fn start_iteration(&self, index: u64) -> IterationRecord;

    fn finalize_iteration(&self, record: IterationRecord);

    /// Called once, after every worker has exited.
    fn end(&self);
}

impl<C: Collector + ?Sized> Collector for &C {
    fn start(&self) {
        (**self).start();
    }

    fn start_iteration(&self, index: u64) -> IterationRecord {
        (**self).start_iteration(index)
    }

    fn finalize_iteration(&self, record: IterationRecord) {
        (**self).finalize_iteration(record);
    }

    fn end(&self) {
        (**self).end();
    }
}

/// Wall-clock anchors of one run. Each anchor can only be set once.
#[derive(Debug)]
pub(crate) struct RunClock {
    created: Instant,
    started: OnceLock<Instant>,
    ended: OnceLock<Instant>,
}

impl RunClock {
    pub(crate) fn new() -> Self {
        Self {
            created: Instant::now(),
            started: OnceLock::new(),
            ended: OnceLock::new(),
        }
    }

    pub(crate) fn start_at(&self, at: Instant) {
        let _ = self.started.set(at);
    }

    pub(crate) fn end_at(&self, at: Instant) {
        let _ = self.ended.set(at);
    }

    /// Run start; the construction time until `start` is called.
    pub(crate) fn started(&self) -> Instant {
        self.started.get().copied().unwrap_or(self.created)
    }

    pub(crate) fn ended(&self) -> Option<Instant> {
        self.ended.get().copied()
    }

    /// Total wall time. Measured up to now while the run is still going.
    pub(crate) fn wall_time(&self) -> Duration {
        let end = self.ended().unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.started())
    }
}
