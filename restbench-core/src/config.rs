use std::time::Duration;

use crate::work::{Classifier, WorkFactory};
use crate::CancelToken;

/// Attempt bound for runs driven by duration alone.
pub const UNBOUNDED_ITERATIONS: u64 = u64::MAX;

/// Configuration for one run. Owned by the caller; the pool only borrows it.
pub struct RunConfig<F: WorkFactory> {
    /// Upper bound on attempts.
    pub iterations: u64,
    /// No new attempt starts after `start + duration`. Zero disables the cutoff.
    pub duration: Duration,
    pub concurrency: usize,
    /// Minimum spacing before each attempt, overlapped with unit construction.
    pub throttle: Duration,
    /// Run `concurrency` untracked attempts before the timed phase.
    pub warming: bool,
    pub reconnect: bool,
    pub cancel: CancelToken,
    pub factory: F,
    pub classifier: Option<Classifier<F::Output>>,
}

impl<F: WorkFactory> RunConfig<F> {
    #[must_use]
    pub fn new(factory: F, iterations: u64) -> Self {
        Self {
            iterations,
            duration: Duration::ZERO,
            concurrency: 1,
            throttle: Duration::ZERO,
            warming: false,
            reconnect: false,
            cancel: CancelToken::new(),
            factory,
            classifier: None,
        }
    }

    /// Clamps values the pool cannot honor.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    #[must_use]
    pub fn with_warming(mut self, warming: bool) -> Self {
        self.warming = warming;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier<F::Output>) -> Self {
        self.classifier = Some(classifier);
        self
    }
}

impl<F: WorkFactory> std::fmt::Debug for RunConfig<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("iterations", &self.iterations)
            .field("duration", &self.duration)
            .field("concurrency", &self.concurrency)
            .field("throttle", &self.throttle)
            .field("warming", &self.warming)
            .field("reconnect", &self.reconnect)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("classifier", &self.classifier.is_some())
            .finish_non_exhaustive()
    }
}
