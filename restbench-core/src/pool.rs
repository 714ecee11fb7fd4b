use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::gate::{AttemptGate, Refusal};
use crate::work::{DEFAULT_SUCCESS_STATUS, Response, WorkFactory, WorkUnit};
use crate::{Collector, Error, IterationError, Result, RunConfig};

/// Pause between enqueueing warm-up attempts and starting the timed phase.
/// Best effort: warm-ups still in flight are not waited for.
pub const WARMUP_GRACE: Duration = Duration::from_millis(250);

/// Name prefix of pool threads; the worker id follows it.
pub const WORKER_THREAD_PREFIX: &str = "restbench-worker-";

const MAX_QUEUE_CAPACITY: u64 = 4096;

#[derive(Debug, Clone, Copy)]
enum Job {
    Warmup,
    Attempt(u64),
}

/// What the pool did with the scheduled work. Informational only; success and
/// failure counts live in the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Indices pushed onto the queue.
    pub scheduled: u64,
    /// Attempts handed to the collector.
    pub executed: u64,
    pub dropped_deadline: u64,
    pub dropped_cancelled: u64,
    pub warmups: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    executed: AtomicU64,
    dropped_deadline: AtomicU64,
    dropped_cancelled: AtomicU64,
    warmups: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RunOutcome {
        RunOutcome {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            dropped_deadline: self.dropped_deadline.load(Ordering::Relaxed),
            dropped_cancelled: self.dropped_cancelled.load(Ordering::Relaxed),
            warmups: self.warmups.load(Ordering::Relaxed),
        }
    }
}

/// Runs `cfg` to completion on `cfg.concurrency` OS threads, reporting every
/// attempt to `collector`.
///
/// Blocks until every worker has exited, then calls [`Collector::end`]. Attempt
/// failures are recorded on the collector, never returned.
///
/// # Errors
///
/// Returns [`Error::SpawnWorker`] if a worker thread cannot be started. No attempt
/// has been made in that case.
pub fn run<F, C>(cfg: &RunConfig<F>, collector: &C) -> Result<RunOutcome>
where
    F: WorkFactory,
    C: Collector + ?Sized,
{
    let concurrency = cfg.concurrency.max(1);
    let capacity = usize::try_from(cfg.iterations.clamp(1, MAX_QUEUE_CAPACITY)).unwrap_or(1);
    let (tx, rx) = crossbeam_channel::bounded::<Job>(capacity);

    let gate = AttemptGate::new(cfg.cancel.clone(), cfg.duration);
    let counters = Counters::default();

    tracing::debug!(
        iterations = cfg.iterations,
        duration = ?cfg.duration,
        concurrency,
        throttle = ?cfg.throttle,
        warming = cfg.warming,
        reconnect = cfg.reconnect,
        "starting worker pool"
    );

    thread::scope(|s| -> Result<()> {
        for id in 0..concurrency {
            let worker = Worker {
                id,
                cfg,
                collector,
                gate: &gate,
                counters: &counters,
            };
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{WORKER_THREAD_PREFIX}{id}"))
                .spawn_scoped(s, move || worker.run(rx));

            if let Err(err) = spawned {
                // Closing the queue lets the workers already running exit.
                drop(tx);
                return Err(Error::SpawnWorker(err));
            }
        }
        drop(rx);

        produce(cfg, concurrency, collector, &gate, &counters, tx);
        Ok(())
    })?;

    collector.end();

    let outcome = counters.snapshot();
    tracing::debug!(?outcome, "worker pool finished");
    Ok(outcome)
}

fn produce<F, C>(
    cfg: &RunConfig<F>,
    concurrency: usize,
    collector: &C,
    gate: &AttemptGate,
    counters: &Counters,
    tx: Sender<Job>,
) where
    F: WorkFactory,
    C: Collector + ?Sized,
{
    if cfg.warming {
        tracing::debug!(attempts = concurrency, "warming connections");
        for _ in 0..concurrency {
            if gate.cancelled() || tx.send(Job::Warmup).is_err() {
                break;
            }
        }
        // A cancelled warm-up still opens the timed phase, so `start` pairs with `end`.
        if gate.cancelled() {
            tracing::debug!("cancelled during warm-up");
        } else {
            thread::sleep(WARMUP_GRACE);
        }
    }

    gate.start_at(Instant::now());
    collector.start();

    for index in 0..cfg.iterations {
        match gate.admit() {
            Ok(()) => {}
            Err(Refusal::Cancelled) => {
                tracing::debug!(index, "cancelled; no further attempts scheduled");
                break;
            }
            Err(Refusal::Deadline) => {
                tracing::debug!(index, "deadline passed; no further attempts scheduled");
                break;
            }
        }

        if tx.send(Job::Attempt(index)).is_err() {
            break;
        }
        counters.scheduled.fetch_add(1, Ordering::Relaxed);
    }
}

struct Worker<'a, F: WorkFactory, C: ?Sized> {
    id: usize,
    cfg: &'a RunConfig<F>,
    collector: &'a C,
    gate: &'a AttemptGate,
    counters: &'a Counters,
}

impl<F, C> Worker<'_, F, C>
where
    F: WorkFactory,
    C: Collector + ?Sized,
{
    fn run(self, rx: Receiver<Job>) {
        tracing::trace!(worker = self.id, "worker started");
        // Keep draining after cancellation or the deadline so the producer never stalls.
        for job in rx.iter() {
            match job {
                Job::Warmup => self.warm_up(),
                Job::Attempt(index) => self.attempt(index),
            }
        }
        tracing::trace!(worker = self.id, "worker exiting");
    }

    fn warm_up(&self) {
        if self.gate.cancelled() {
            return;
        }
        // Warm-ups prime the shared transport, so never ask for a fresh one.
        let result = self.build_unit(false).and_then(invoke);
        self.counters.warmups.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = result {
            tracing::debug!(worker = self.id, %err, "warm-up attempt failed");
        }
    }

    fn attempt(&self, index: u64) {
        match self.gate.admit() {
            Ok(()) => {}
            Err(Refusal::Cancelled) => {
                self.counters.dropped_cancelled.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(Refusal::Deadline) => {
                self.counters.dropped_deadline.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let unit = self.build_unit(self.cfg.reconnect);
        let mut record = self.collector.start_iteration(index);

        match unit.and_then(invoke) {
            Ok(res) => {
                record.end_iteration(None);
                if let Some(err) = self.classify(&res) {
                    record.update_error(err);
                }
            }
            Err(err) => record.end_iteration(Some(err)),
        }

        tracing::trace!(
            worker = self.id,
            index,
            elapsed = ?record.elapsed(),
            error = record.error().map(tracing::field::display),
            "attempt finished"
        );

        self.collector.finalize_iteration(record);
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Builds the unit and waits out the throttle concurrently, so the added
    /// latency is the larger of the two rather than their sum.
    fn build_unit(
        &self,
        reconnect: bool,
    ) -> std::result::Result<WorkUnit<F::Output>, IterationError> {
        let began = Instant::now();
        let unit = panic::catch_unwind(AssertUnwindSafe(|| self.cfg.factory.make(reconnect)))
            .map_err(IterationError::from_panic);

        let remaining = self.cfg.throttle.saturating_sub(began.elapsed());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        unit
    }

    fn classify(&self, res: &F::Output) -> Option<IterationError> {
        match &self.cfg.classifier {
            Some(classifier) => {
                match panic::catch_unwind(AssertUnwindSafe(|| classifier(res))) {
                    Ok(verdict) => verdict.map(IterationError::Rejected),
                    Err(payload) => Some(IterationError::from_panic(payload)),
                }
            }
            None => {
                let status = res.status();
                (status != DEFAULT_SUCCESS_STATUS).then_some(IterationError::UnexpectedStatus(status))
            }
        }
    }
}

fn invoke<R>(unit: WorkUnit<R>) -> std::result::Result<R, IterationError> {
    match panic::catch_unwind(AssertUnwindSafe(unit)) {
        Ok(Ok(res)) => Ok(res),
        Ok(Err(err)) => Err(IterationError::Transport(err.to_string())),
        Err(payload) => Err(IterationError::from_panic(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{BoxError, WorkOutcome};
    use crate::{CancelToken, IterationRecord, LatencyProfile, Report};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Status(u16);

    impl Response for Status {
        fn status(&self) -> u16 {
            self.0
        }
    }

    fn ok_unit(_reconnect: bool) -> WorkUnit<Status> {
        Box::new(|| Ok(Status(200)))
    }

    /// Records every collector call for ordering assertions.
    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
        records: Mutex<Vec<IterationRecord>>,
    }

    impl Collector for Recording {
        fn start(&self) {
            self.events.lock().push("start".to_string());
        }

        fn start_iteration(&self, index: u64) -> IterationRecord {
            self.events.lock().push(format!("start_iteration:{index}"));
            IterationRecord::new(index, Instant::now())
        }

        fn finalize_iteration(&self, record: IterationRecord) {
            self.events
                .lock()
                .push(format!("finalize_iteration:{}", record.index()));
            self.records.lock().push(record);
        }

        fn end(&self) {
            self.events.lock().push("end".to_string());
        }
    }

    fn run_ok<F: WorkFactory, C: Collector>(cfg: &RunConfig<F>, collector: &C) -> RunOutcome {
        match run(cfg, collector) {
            Ok(outcome) => outcome,
            Err(err) => panic!("run failed: {err}"),
        }
    }

    #[test]
    fn single_worker_calls_collector_in_order() {
        let cfg = RunConfig::new(ok_unit, 3);
        let collector = Recording::default();
        let outcome = run_ok(&cfg, &collector);

        assert_eq!(outcome.executed, 3);
        assert_eq!(
            *collector.events.lock(),
            vec![
                "start",
                "start_iteration:0",
                "finalize_iteration:0",
                "start_iteration:1",
                "finalize_iteration:1",
                "start_iteration:2",
                "finalize_iteration:2",
                "end",
            ]
        );
    }

    #[test]
    fn transport_errors_are_recorded_not_returned() {
        let factory = |_reconnect: bool| -> WorkUnit<Status> {
            Box::new(|| Err(BoxError::from("connection refused")))
        };
        let cfg = RunConfig::new(factory, 2).with_concurrency(2);
        let collector = Recording::default();
        run_ok(&cfg, &collector);

        let records = collector.records.lock();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| {
            r.error() == Some(&IterationError::Transport("connection refused".to_string()))
        }));
    }

    #[test]
    fn panicking_factory_and_unit_become_failed_iterations() {
        let factory = |_reconnect: bool| -> WorkUnit<Status> {
            static CALLS: AtomicU64 = AtomicU64::new(0);
            if CALLS.fetch_add(1, Ordering::Relaxed) == 0 {
                panic!("factory exploded");
            }
            Box::new(|| -> WorkOutcome<Status> { panic!("unit exploded") })
        };
        let cfg = RunConfig::new(factory, 2);
        let profile = match LatencyProfile::new(2) {
            Ok(p) => p,
            Err(err) => panic!("profile: {err}"),
        };
        run_ok(&cfg, &profile);

        let errors: Vec<Option<IterationError>> =
            profile.records().map(|r| r.error().cloned()).collect();
        assert_eq!(
            errors,
            vec![
                Some(IterationError::Panicked("factory exploded".to_string())),
                Some(IterationError::Panicked("unit exploded".to_string())),
            ]
        );
        assert_eq!(profile.totals().failures, 2);
    }

    #[test]
    fn non_default_status_fails_without_classifier() {
        let factory = |_reconnect: bool| -> WorkUnit<Status> { Box::new(|| Ok(Status(201))) };
        let cfg = RunConfig::new(factory, 1);
        let collector = Recording::default();
        run_ok(&cfg, &collector);

        assert_eq!(
            collector.records.lock()[0].error(),
            Some(&IterationError::UnexpectedStatus(201))
        );
    }

    #[test]
    fn classifier_overrides_status_check() {
        let factory = |_reconnect: bool| -> WorkUnit<Status> { Box::new(|| Ok(Status(404))) };
        let cfg = RunConfig::new(factory, 1).with_classifier(crate::expect_status(404));
        let collector = Recording::default();
        run_ok(&cfg, &collector);

        assert!(collector.records.lock()[0].is_success());
    }

    #[test]
    fn reconnect_hint_reaches_the_factory() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_factory = seen.clone();
        let factory = move |reconnect: bool| -> WorkUnit<Status> {
            seen_by_factory.lock().push(reconnect);
            Box::new(|| Ok(Status(200)))
        };
        let cfg = RunConfig::new(factory, 2)
            .with_reconnect(true)
            .with_warming(true)
            .with_concurrency(1);
        let collector = Recording::default();
        let outcome = run_ok(&cfg, &collector);

        assert_eq!(outcome.warmups, 1);
        // Warm-up first (shared transport), then both timed attempts.
        assert_eq!(*seen.lock(), vec![false, true, true]);
        assert_eq!(collector.records.lock().len(), 2);
    }

    #[test]
    fn cancelled_before_start_schedules_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let cfg = RunConfig::new(ok_unit, 10).with_cancel(cancel);
        let collector = Recording::default();
        let outcome = run_ok(&cfg, &collector);

        assert_eq!(outcome.scheduled, 0);
        assert_eq!(*collector.events.lock(), vec!["start", "end"]);
    }

    #[test]
    fn cancelled_warm_up_still_brackets_the_run() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let cfg = RunConfig::new(ok_unit, 10)
            .with_warming(true)
            .with_concurrency(2)
            .with_cancel(cancel);
        let collector = Recording::default();

        let began = Instant::now();
        let outcome = run_ok(&cfg, &collector);

        assert!(began.elapsed() < WARMUP_GRACE, "grace period was not skipped");
        assert_eq!(outcome.warmups, 0);
        assert_eq!(outcome.scheduled, 0);
        assert_eq!(*collector.events.lock(), vec!["start", "end"]);
    }

    #[test]
    fn cancellation_mid_run_lets_in_flight_attempts_finish() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let factory = move |_reconnect: bool| -> WorkUnit<Status> {
            let trigger = trigger.clone();
            Box::new(move || {
                trigger.cancel();
                thread::sleep(Duration::from_millis(20));
                Ok(Status(200))
            })
        };
        let cfg = RunConfig::new(factory, 100).with_cancel(cancel);
        let collector = Recording::default();
        let outcome = run_ok(&cfg, &collector);

        let records = collector.records.lock();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_success());
        assert_eq!(outcome.executed, 1);
    }

    #[test]
    fn throttle_overlaps_with_construction() {
        let factory = |_reconnect: bool| -> WorkUnit<Status> {
            thread::sleep(Duration::from_millis(30));
            Box::new(|| Ok(Status(200)))
        };
        let cfg = RunConfig::new(factory, 3).with_throttle(Duration::from_millis(60));
        let collector = Recording::default();

        let began = Instant::now();
        run_ok(&cfg, &collector);
        let elapsed = began.elapsed();

        // max(30, 60) per attempt, not 30 + 60.
        assert!(elapsed >= Duration::from_millis(180), "elapsed={elapsed:?}");
        assert!(elapsed < Duration::from_millis(270), "elapsed={elapsed:?}");
    }

    #[test]
    fn zero_iterations_runs_nothing() {
        let cfg = RunConfig::new(ok_unit, 0).with_concurrency(4);
        let collector = Recording::default();
        let outcome = run_ok(&cfg, &collector);
        assert_eq!(outcome, RunOutcome::default());
        assert!(collector.records.lock().is_empty());
    }
}
