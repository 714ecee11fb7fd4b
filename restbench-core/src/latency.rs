//! Fixed-repetition latency profile.
//!
//! One slot per iteration index. Slots are addressed by index rather than arrival
//! order, so concurrent workers never write the same slot.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use crate::collector::RunClock;
use crate::format::duration_ms;
use crate::report::{DumpOptions, Report, Table, Totals, ms_cell};
use crate::{Collector, Error, IterationRecord, Result};

/// Upper bound on slots a profile will allocate.
pub const MAX_PROFILE_ITERATIONS: u64 = 1_000_000;

/// Trimmed averages below this multiple of the standard deviation are flagged.
const HIGH_VARIANCE_FACTOR: f64 = 10.0;

const HIGH_VARIANCE_MESSAGE: &str = "high variance: trimmed average below 10x stddev";

const SUMMARY_HEADERS: &[&str] = &[
    "label",
    "count",
    "errors",
    "average",
    "high",
    "high_index",
    "low",
    "low_index",
    "trimmed_average",
    "total",
    "message",
];

const DETAIL_HEADERS: &[&str] = &[
    "index",
    "latency",
    "start_offset",
    "end_offset",
    "error",
    "error_text",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extreme {
    pub index: u64,
    pub ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    /// Finalized attempts, successful or not.
    pub count: u64,
    pub errors: u64,
    pub average_ms: f64,
    pub high: Option<Extreme>,
    pub low: Option<Extreme>,
    pub trimmed_average_ms: f64,
    /// Population standard deviation over successful attempts.
    pub stddev_ms: f64,
    pub wall_time_ms: f64,
    pub message: Option<&'static str>,
}

#[derive(Debug)]
pub struct LatencyProfile {
    slots: Vec<OnceLock<IterationRecord>>,
    clock: RunClock,
    summary: OnceLock<LatencySummary>,
}

impl LatencyProfile {
    pub fn new(iterations: u64) -> Result<Self> {
        if iterations == 0 {
            return Err(Error::InvalidIterations);
        }
        if iterations > MAX_PROFILE_ITERATIONS {
            return Err(Error::TooManyIterations {
                got: iterations,
                max: MAX_PROFILE_ITERATIONS,
            });
        }

        let slots = (0..iterations).map(|_| OnceLock::new()).collect();
        Ok(Self {
            slots,
            clock: RunClock::new(),
            summary: OnceLock::new(),
        })
    }

    pub fn start_at(&self, at: Instant) {
        self.clock.start_at(at);
    }

    pub fn end_at(&self, at: Instant) {
        self.clock.end_at(at);
    }

    /// Summary of the run. Computed on first access and frozen afterwards.
    pub fn summary(&self) -> &LatencySummary {
        self.summary.get_or_init(|| self.summarize())
    }

    pub fn records(&self) -> impl Iterator<Item = &IterationRecord> {
        self.slots.iter().filter_map(OnceLock::get)
    }

    fn summarize(&self) -> LatencySummary {
        let mut count = 0u64;
        let mut errors = 0u64;
        let mut samples: Vec<(u64, f64)> = Vec::new();

        for rec in self.records() {
            count = count.saturating_add(1);
            if rec.is_success() {
                samples.push((rec.index(), duration_ms(rec.elapsed())));
            } else {
                errors = errors.saturating_add(1);
            }
        }

        let stats = SampleStats::from_samples(&samples);
        let message = stats
            .as_ref()
            .filter(|s| s.trimmed_average_ms < HIGH_VARIANCE_FACTOR * s.stddev_ms)
            .map(|_| HIGH_VARIANCE_MESSAGE);

        LatencySummary {
            count,
            errors,
            average_ms: stats.as_ref().map_or(0.0, |s| s.average_ms),
            high: stats.as_ref().map(|s| s.high),
            low: stats.as_ref().map(|s| s.low),
            trimmed_average_ms: stats.as_ref().map_or(0.0, |s| s.trimmed_average_ms),
            stddev_ms: stats.as_ref().map_or(0.0, |s| s.stddev_ms),
            wall_time_ms: duration_ms(self.clock.wall_time()),
            message,
        }
    }

    fn summary_row(&self, label: &str, opts: &DumpOptions) -> Vec<String> {
        let s = self.summary();
        let fmt = opts.format;
        let extreme = |e: Option<Extreme>| match e {
            Some(e) => (ms_cell(e.ms, fmt), e.index.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        let (high, high_index) = extreme(s.high);
        let (low, low_index) = extreme(s.low);

        vec![
            label.to_string(),
            s.count.to_string(),
            s.errors.to_string(),
            ms_cell(s.average_ms, fmt),
            high,
            high_index,
            low,
            low_index,
            ms_cell(s.trimmed_average_ms, fmt),
            ms_cell(s.wall_time_ms, fmt),
            s.message.unwrap_or_default().to_string(),
        ]
    }

    fn detail_table(&self, opts: &DumpOptions) -> Table {
        let fmt = opts.format;
        let run_start = self.clock.started();
        let run_end = self.clock.ended().unwrap_or_else(Instant::now);

        let mut table = Table::new(DETAIL_HEADERS);
        for rec in self.records() {
            let start_offset = rec.started().saturating_duration_since(run_start);
            let end_offset = run_end.saturating_duration_since(rec.ended());
            let (marker, text) = match rec.error() {
                Some(err) => ("*".to_string(), err.to_string()),
                None => (String::new(), String::new()),
            };
            table.push(vec![
                rec.index().to_string(),
                ms_cell(duration_ms(rec.elapsed()), fmt),
                ms_cell(duration_ms(start_offset), fmt),
                ms_cell(duration_ms(end_offset), fmt),
                marker,
                text,
            ]);
        }
        table
    }
}

impl Collector for LatencyProfile {
    fn start(&self) {
        self.start_at(Instant::now());
    }

    fn start_iteration(&self, index: u64) -> IterationRecord {
        IterationRecord::new(index, Instant::now())
    }

    fn finalize_iteration(&self, record: IterationRecord) {
        let index = record.index();
        let Some(slot) = usize::try_from(index).ok().and_then(|i| self.slots.get(i)) else {
            tracing::warn!(index, "iteration index outside latency profile");
            return;
        };
        if slot.set(record).is_err() {
            tracing::warn!(index, "iteration finalized twice; keeping first record");
        }
    }

    fn end(&self) {
        self.end_at(Instant::now());
    }
}

impl Report for LatencyProfile {
    fn totals(&self) -> Totals {
        let s = self.summary();
        Totals {
            attempts: s.count,
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
            self.detail_table(opts).write(out, opts)?;
        }
        Ok(())
    }
}

struct SampleStats {
    average_ms: f64,
    high: Extreme,
    low: Extreme,
    trimmed_average_ms: f64,
    stddev_ms: f64,
}

impl SampleStats {
    /// `None` when there are no successful samples.
    fn from_samples(samples: &[(u64, f64)]) -> Option<Self> {
        let (&(first_index, first_ms), rest) = samples.split_first()?;

        let mut sum = first_ms;
        let mut high = Extreme {
            index: first_index,
            ms: first_ms,
        };
        let mut low = high;

        for &(index, ms) in rest {
            sum += ms;
            if ms > high.ms {
                high = Extreme { index, ms };
            }
            if ms < low.ms {
                low = Extreme { index, ms };
            }
        }

        let n = samples.len() as f64;
        let average_ms = sum / n;
        let trimmed_average_ms = if samples.len() > 2 {
            (sum - high.ms - low.ms) / (n - 2.0)
        } else {
            average_ms
        };

        let variance = samples
            .iter()
            .map(|&(_, ms)| (ms - average_ms).powi(2))
            .sum::<f64>()
            / n;

        Some(Self {
            average_ms,
            high,
            low,
            trimmed_average_ms,
            stddev_ms: variance.sqrt(),
        })
    }
}
