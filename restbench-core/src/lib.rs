mod cancel;
mod collector;
mod config;
mod error;
mod format;
mod gate;
mod latency;
mod pool;
mod record;
mod report;
mod window;
mod work;

pub use cancel::CancelToken;
pub use collector::Collector;
pub use config::{RunConfig, UNBOUNDED_ITERATIONS};
pub use error::{Error, IterationError, Result};
pub use format::{duration_ms, format_duration, format_millis, format_rate};
pub use latency::{Extreme, LatencyProfile, LatencySummary, MAX_PROFILE_ITERATIONS};
pub use pool::{RunOutcome, WARMUP_GRACE, WORKER_THREAD_PREFIX, run};
pub use record::IterationRecord;
pub use report::{DumpOptions, Report, ReportFormat, Totals};
pub use window::{
    BucketCounts, DEFAULT_BUCKET_COUNT, LoadWindow, MAX_BUCKET_COUNT, MIN_WINDOW, WindowSummary,
};
pub use work::{
    BoxError, Classifier, DEFAULT_SUCCESS_STATUS, Response, WorkFactory, WorkOutcome, WorkUnit,
    expect_status,
};
