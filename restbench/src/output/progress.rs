use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use restbench_core::{Collector, IterationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgressKind {
    /// Position counts finalized attempts.
    Counted,
    /// Position is elapsed milliseconds of the measured window.
    Timed,
}

/// Collector decorator that advances a progress bar on stderr per finalized attempt.
pub(crate) struct ProgressCollector<C> {
    inner: C,
    bar: ProgressBar,
    kind: ProgressKind,
    failures: AtomicU64,
}

impl<C: Collector> ProgressCollector<C> {
    pub(crate) fn counted(inner: C, total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(5));
        bar.set_style(counted_style());
        Self::with_bar(inner, bar, ProgressKind::Counted)
    }

    pub(crate) fn timed(inner: C, window: Duration) -> Self {
        let total_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let bar =
            ProgressBar::with_draw_target(Some(total_ms), ProgressDrawTarget::stderr_with_hz(5));
        bar.set_style(timed_style());
        Self::with_bar(inner, bar, ProgressKind::Timed)
    }

    fn with_bar(inner: C, bar: ProgressBar, kind: ProgressKind) -> Self {
        Self {
            inner,
            bar,
            kind,
            failures: AtomicU64::new(0),
        }
    }
}

impl<C: Collector> Collector for ProgressCollector<C> {
    fn start(&self) {
        self.bar.reset_elapsed();
        self.inner.start();
    }

    fn start_iteration(&self, index: u64) -> IterationRecord {
        self.inner.start_iteration(index)
    }

    fn finalize_iteration(&self, record: IterationRecord) {
        let failed = !record.is_success();
        self.inner.finalize_iteration(record);

        if failed {
            let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
            self.bar.set_message(format!("failures={failures}"));
        }

        match self.kind {
            ProgressKind::Counted => self.bar.inc(1),
            ProgressKind::Timed => {
                let elapsed_ms = u64::try_from(self.bar.elapsed().as_millis()).unwrap_or(u64::MAX);
                let total_ms = self.bar.length().unwrap_or(u64::MAX);
                self.bar.set_position(elapsed_ms.min(total_ms));
            }
        }
    }

    fn end(&self) {
        self.inner.end();
        self.bar.finish_and_clear();
    }
}

fn counted_style() -> ProgressStyle {
    ProgressStyle::with_template("[ {bar:20.cyan/blue} ] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

fn timed_style() -> ProgressStyle {
    ProgressStyle::with_template("[ {bar:20.cyan/blue} ] {elapsed} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

#[cfg(test)]
mod tests {
    use super::*;
    use restbench_core::{IterationError, LatencyProfile, Report};
    use std::time::Instant;

    #[test]
    fn counted_progress_delegates_every_call() {
        let profile = match LatencyProfile::new(3) {
            Ok(p) => p,
            Err(err) => panic!("profile: {err}"),
        };
        let progress = ProgressCollector::counted(&profile, 3);

        progress.start();
        for index in 0..3 {
            let mut record = progress.start_iteration(index);
            let err = (index == 1).then(|| IterationError::UnexpectedStatus(500));
            record.end_iteration_at(Instant::now(), err);
            progress.finalize_iteration(record);
        }
        progress.end();

        assert_eq!(progress.bar.position(), 3);
        assert_eq!(progress.failures.load(Ordering::Relaxed), 1);
        assert_eq!(profile.totals().attempts, 3);
        assert_eq!(profile.totals().failures, 1);
    }
}
