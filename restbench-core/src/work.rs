use std::sync::Arc;

/// Status treated as success when no classifier is configured.
pub const DEFAULT_SUCCESS_STATUS: u16 = 200;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one network transaction.
pub type WorkOutcome<R> = std::result::Result<R, BoxError>;

/// A single attempt, built fresh by a [`WorkFactory`] for every iteration.
pub type WorkUnit<R> = Box<dyn FnOnce() -> WorkOutcome<R> + Send>;

/// Reclassifies a transport-level success. Returning `Some(reason)` marks the
/// attempt as failed.
pub type Classifier<R> = Arc<dyn Fn(&R) -> Option<String> + Send + Sync>;

pub trait Response {
    fn status(&self) -> u16;
}

/// Produces one [`WorkUnit`] per attempt.
///
/// `reconnect` is a hint that the unit should use a fresh transport instead of a
/// shared connection pool.
pub trait WorkFactory: Send + Sync {
    type Output: Response + Send + 'static;

    fn make(&self, reconnect: bool) -> WorkUnit<Self::Output>;
}

impl<F, R> WorkFactory for F
where
    F: Fn(bool) -> WorkUnit<R> + Send + Sync,
    R: Response + Send + 'static,
{
    type Output = R;

    fn make(&self, reconnect: bool) -> WorkUnit<R> {
        (self)(reconnect)
    }
}

/// Builds a classifier that accepts exactly one status.
#[must_use]
pub fn expect_status<R: Response>(expected: u16) -> Classifier<R> {
    Arc::new(move |res: &R| {
        let status = res.status();
        (status != expected).then(|| format!("expected status {expected}, got {status}"))
    })
}
