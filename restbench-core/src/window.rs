//! Sustained-load profile over a wall-clock window.
//!
//! The run duration is split into equal buckets. Start and completion events are
//! attributed independently to the bucket covering the moment they happened, so a
//! single attempt may start in one bucket and complete in another.

use std::io::Write;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::collector::RunClock;
use crate::format::{duration_ms, format_duration, format_rate};
use crate::report::{DumpOptions, Report, ReportFormat, Table, Totals, ms_cell};
use crate::{Collector, Error, IterationRecord, Result};

pub const DEFAULT_BUCKET_COUNT: usize = 10;

/// Upper bound on buckets; each one is a separately locked counter.
pub const MAX_BUCKET_COUNT: usize = 10_000;

/// Floor applied to the window length before dividing by it.
pub const MIN_WINDOW: Duration = Duration::from_millis(1);

const SUMMARY_HEADERS: &[&str] = &[
    "label",
    "started",
    "completed",
    "errors",
    "late_starts",
    "duration",
    "requests_per_sec",
    "avg_per_request",
    "failures_per_sec",
];

const BUCKET_HEADERS: &[&str] = &["bucket", "started", "completed", "errors"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounts {
    pub started: u64,
    pub completed: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    pub started: u64,
    pub completed: u64,
    pub errors: u64,
    /// Attempts that began after the last bucket boundary.
    pub late_starts: u64,
    pub requests_per_second: f64,
    /// Zero when nothing started.
    pub avg_seconds_per_request: f64,
    pub failures_per_second: f64,
    pub buckets: Vec<BucketCounts>,
}

#[derive(Debug)]
pub struct LoadWindow {
    duration: Duration,
    bucket_width: Duration,
    buckets: Vec<Mutex<BucketCounts>>,
    late_starts: Mutex<u64>,
    clock: RunClock,
    summary: OnceLock<WindowSummary>,
}

impl LoadWindow {
    pub fn new(duration: Duration, bucket_count: usize) -> Result<Self> {
        if duration.is_zero() {
            return Err(Error::InvalidWindowDuration);
        }
        let divisor = u32::try_from(bucket_count)
            .ok()
            .filter(|_| (1..=MAX_BUCKET_COUNT).contains(&bucket_count))
            .ok_or(Error::InvalidBucketCount {
                got: bucket_count,
                max: MAX_BUCKET_COUNT,
            })?;

        let bucket_width = (duration / divisor).max(Duration::from_nanos(1));
        let buckets = (0..bucket_count)
            .map(|_| Mutex::new(BucketCounts::default()))
            .collect();

        Ok(Self {
            duration,
            bucket_width,
            buckets,
            late_starts: Mutex::new(0),
            clock: RunClock::new(),
            summary: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    /// Re-anchors every bucket boundary to `at`.
    pub fn start_at(&self, at: Instant) {
        self.clock.start_at(at);
    }

    pub fn end_at(&self, at: Instant) {
        self.clock.end_at(at);
    }

    pub fn start_iteration_at(&self, index: u64, at: Instant) -> IterationRecord {
        match self.bucket_index(at).and_then(|i| self.buckets.get(i)) {
            Some(bucket) => bucket.lock().started += 1,
            None => *self.late_starts.lock() += 1,
        }
        IterationRecord::new(index, at)
    }

    /// First bucket whose end boundary lies after `at`, or `None` past the window.
    fn bucket_index(&self, at: Instant) -> Option<usize> {
        let offset = at.saturating_duration_since(self.clock.started());
        let idx = offset.as_nanos() / self.bucket_width.as_nanos();
        usize::try_from(idx)
            .ok()
            .filter(|i| *i < self.buckets.len())
    }

    pub fn summary(&self) -> &WindowSummary {
        self.summary.get_or_init(|| self.summarize())
    }

    fn summarize(&self) -> WindowSummary {
        let buckets: Vec<BucketCounts> = self.buckets.iter().map(|b| *b.lock()).collect();
        let late_starts = *self.late_starts.lock();

        let (started, completed, errors) =
            buckets.iter().fold((0u64, 0u64, 0u64), |(s, c, e), b| {
                (
                    s.saturating_add(b.started),
                    c.saturating_add(b.completed),
                    e.saturating_add(b.errors),
                )
            });

        let secs = self.duration.max(MIN_WINDOW).as_secs_f64();
        let avg_seconds_per_request = if started == 0 {
            0.0
        } else {
            secs / started as f64
        };

        WindowSummary {
            started,
            completed,
            errors,
            late_starts,
            requests_per_second: started as f64 / secs,
            avg_seconds_per_request,
            failures_per_second: errors as f64 / secs,
            buckets,
        }
    }

    fn summary_row(&self, label: &str, opts: &DumpOptions) -> Vec<String> {
        let s = self.summary();
        let fmt = opts.format;
        let rate = |v: f64| match fmt {
            ReportFormat::Csv => v.to_string(),
            ReportFormat::Table | ReportFormat::PrettyCsv => format_rate(v),
        };

        vec![
            label.to_string(),
            s.started.to_string(),
            s.completed.to_string(),
            s.errors.to_string(),
            s.late_starts.to_string(),
            ms_cell(duration_ms(self.duration), fmt),
            rate(s.requests_per_second),
            ms_cell(s.avg_seconds_per_request * 1_000.0, fmt),
            rate(s.failures_per_second),
        ]
    }

    fn bucket_table(&self) -> Table {
        let mut table = Table::new(BUCKET_HEADERS);
        let mut lower = Duration::ZERO;
        for b in &self.summary().buckets {
            let upper = lower.saturating_add(self.bucket_width);
            table.push(vec![
                format!("{}-{}", format_duration(lower), format_duration(upper)),
                b.started.to_string(),
                b.completed.to_string(),
                b.errors.to_string(),
            ]);
            lower = upper;
        }
        table
    }
}

impl Collector for LoadWindow {
    fn start(&self) {
        self.start_at(Instant::now());
    }

    fn start_iteration(&self, index: u64) -> IterationRecord {
        self.start_iteration_at(index, Instant::now())
    }

    /// Completions past the window are attributed to the last bucket.
    fn finalize_iteration(&self, record: IterationRecord) {
        let idx = self
            .bucket_index(record.ended())
            .unwrap_or_else(|| self.buckets.len().saturating_sub(1));
        let Some(bucket) = self.buckets.get(idx) else {
            return;
        };

        let mut counts = bucket.lock();
        counts.completed += 1;
        if !record.is_success() {
            counts.errors += 1;
        }
    }

    fn end(&self) {
        self.end_at(Instant::now());
    }
}

impl Report for LoadWindow {
    fn totals(&self) -> Totals {
        let s = self.summary();
        Totals {
            attempts: s.completed,
            failures: s.errors,
        }
    }

    fn write_report(
        &self,
        out: &mut dyn Write,
        label: &str,
        opts: &DumpOptions,
        show_detail: bool,
    ) -> Result<()> {
        let mut table = Table::new(SUMMARY_HEADERS);
        table.push(self.summary_row(label, opts));
        table.write(out, opts)?;

        if show_detail {
            writeln!(out)?;
            self.bucket_table().write(out, opts)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IterationError;

    const EPS: f64 = 1e-9;

    fn window(secs: u64, buckets: usize) -> (LoadWindow, Instant) {
        let w = match LoadWindow::new(Duration::from_secs(secs), buckets) {
            Ok(w) => w,
            Err(err) => panic!("window: {err}"),
        };
        let t0 = Instant::now();
        w.start_at(t0);
        (w, t0)
    }

    fn attempt(
        w: &LoadWindow,
        t0: Instant,
        index: u64,
        start_ms: u64,
        end_ms: u64,
        error: Option<IterationError>,
    ) {
        let mut rec = w.start_iteration_at(index, t0 + Duration::from_millis(start_ms));
        rec.end_iteration_at(t0 + Duration::from_millis(end_ms), error);
        w.finalize_iteration(rec);
    }

    #[test]
    fn rejects_invalid_shapes() {
        assert!(matches!(
            LoadWindow::new(Duration::ZERO, 10),
            Err(Error::InvalidWindowDuration)
        ));
        assert!(matches!(
            LoadWindow::new(Duration::from_secs(1), 0),
            Err(Error::InvalidBucketCount { got: 0, .. })
        ));
        assert!(matches!(
            LoadWindow::new(Duration::from_secs(1), MAX_BUCKET_COUNT + 1),
            Err(Error::InvalidBucketCount { .. })
        ));
        assert!(LoadWindow::new(Duration::from_secs(1), MAX_BUCKET_COUNT).is_ok());
    }

    #[test]
    fn early_attempt_lands_in_first_bucket() {
        let (w, t0) = window(10, 10);
        attempt(&w, t0, 0, 500, 650, None);

        let s = w.summary();
        assert_eq!(
            s.buckets[0],
            BucketCounts {
                started: 1,
                completed: 1,
                errors: 0
            }
        );
        assert_eq!(s.late_starts, 0);
    }

    #[test]
    fn start_and_completion_are_bucketed_independently() {
        let (w, t0) = window(10, 10);
        attempt(
            &w,
            t0,
            0,
            1_900,
            3_100,
            Some(IterationError::Transport("reset".to_string())),
        );

        let s = w.summary();
        assert_eq!(s.buckets[1].started, 1);
        assert_eq!(s.buckets[1].completed, 0);
        assert_eq!(s.buckets[3].completed, 1);
        assert_eq!(s.buckets[3].errors, 1);
    }

    #[test]
    fn starts_past_the_window_are_late() {
        let (w, t0) = window(10, 10);
        attempt(&w, t0, 0, 10_001, 10_200, None);

        let s = w.summary();
        assert_eq!(s.late_starts, 1);
        assert_eq!(s.started, 0);
        // Completion past the window falls back to the last bucket.
        assert_eq!(s.buckets[9].completed, 1);
    }

    #[test]
    fn boundary_instant_belongs_to_next_bucket() {
        let (w, t0) = window(10, 10);
        attempt(&w, t0, 0, 1_000, 1_000, None);
        assert_eq!(w.summary().buckets[1].started, 1);
    }

    #[test]
    fn rates_use_configured_duration() {
        let (w, t0) = window(10, 10);
        for i in 0..20 {
            let err = (i % 4 == 0).then(|| IterationError::UnexpectedStatus(503));
            attempt(&w, t0, i, i * 100, i * 100 + 50, err);
        }

        let s = w.summary();
        assert_eq!(s.started, 20);
        assert_eq!(s.completed, 20);
        assert_eq!(s.errors, 5);
        assert!((s.requests_per_second - 2.0).abs() < EPS);
        assert!((s.avg_seconds_per_request - 0.5).abs() < EPS);
        assert!((s.failures_per_second - 0.5).abs() < EPS);
        assert_eq!(w.totals(), Totals { attempts: 20, failures: 5 });
    }

    #[test]
    fn nothing_started_reports_zero_average() {
        let (w, _) = window(1, 4);
        let s = w.summary();
        assert_eq!(s.started, 0);
        assert!(s.avg_seconds_per_request.abs() < EPS);
        assert!(s.requests_per_second.abs() < EPS);
    }

    #[test]
    fn dumping_twice_is_stable() {
        let (w, t0) = window(2, 2);
        attempt(&w, t0, 0, 10, 20, None);
        w.end_at(t0 + Duration::from_secs(2));

        let opts = DumpOptions::default();
        let mut a = Vec::new();
        let mut b = Vec::new();
        if let Err(err) = w.write_report(&mut a, "siege", &opts, true) {
            panic!("report: {err}");
        }
        attempt(&w, t0, 1, 30, 40, None);
        if let Err(err) = w.write_report(&mut b, "siege", &opts, true) {
            panic!("report: {err}");
        }
        assert_eq!(a, b);
    }

    #[test]
    fn bucket_table_labels_time_ranges() {
        let (w, t0) = window(2, 2);
        attempt(&w, t0, 0, 1_200, 1_300, None);

        let opts = DumpOptions {
            format: ReportFormat::Csv,
            header: true,
        };
        let mut buf = Vec::new();
        if let Err(err) = w.write_report(&mut buf, "siege", &opts, true) {
            panic!("report: {err}");
        }
        let text = String::from_utf8_lossy(&buf);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "label,started,completed,errors,late_starts,duration,requests_per_sec,avg_per_request,failures_per_sec"
        );
        assert_eq!(lines[1], "siege,1,1,0,0,2000,0.5,2000,0");
        assert_eq!(lines[3], "bucket,started,completed,errors");
        assert_eq!(lines[4], "0ms-1S,0,0,0");
        assert_eq!(lines[5], "1S-2S,1,1,0");
    }
}
