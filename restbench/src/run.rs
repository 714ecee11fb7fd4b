use anyhow::Context as _;
use restbench_core::{
    CancelToken, Collector, LatencyProfile, LoadWindow, RunConfig, RunOutcome,
    UNBOUNDED_ITERATIONS, expect_status,
};
use restbench_http::{DEFAULT_CONNECT_TIMEOUT, HttpRequest, HttpWorkFactory};
use std::time::Duration;

use crate::cli::{BenchArgs, LoadArgs, SiegeArgs, TargetArgs};
use crate::exit_codes::ExitCode;
use crate::output::{self, ProgressCollector};
use crate::quiet_panics::QuietWorkerPanics;
use crate::run_error::RunError;

pub fn bench(args: BenchArgs) -> Result<ExitCode, RunError> {
    let profile = LatencyProfile::new(args.iterations)
        .context("invalid bench configuration")
        .map_err(RunError::InvalidInput)?;

    let session = Session::start()?;
    let cfg = session.run_config(
        &args.target,
        &args.load,
        args.iterations,
        args.duration.unwrap_or_default(),
    )?;

    if args.report.progress {
        execute(&cfg, &ProgressCollector::counted(&profile, args.iterations))?;
    } else {
        execute(&cfg, &profile)?;
    }

    output::print_report(&profile, &args.report, &args.target.url)
}

pub fn siege(args: SiegeArgs) -> Result<ExitCode, RunError> {
    let window = LoadWindow::new(args.duration, args.buckets)
        .context("invalid siege configuration")
        .map_err(RunError::InvalidInput)?;
    if args.iterations == Some(0) {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "`iterations` must be a positive integer"
        )));
    }

    let session = Session::start()?;
    let cfg = session.run_config(
        &args.target,
        &args.load,
        args.iterations.unwrap_or(UNBOUNDED_ITERATIONS),
        args.duration,
    )?;

    if args.report.progress {
        execute(&cfg, &ProgressCollector::timed(&window, args.duration))?;
    } else {
        execute(&cfg, &window)?;
    }

    output::print_report(&window, &args.report, &args.target.url)
}

/// Async runtime backing the HTTP transport, plus the Ctrl-C hook.
struct Session {
    rt: tokio::runtime::Runtime,
    cancel: CancelToken,
}

impl Session {
    fn start() -> Result<Self, RunError> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("restbench-io")
            .build()
            .context("failed to start async runtime")
            .map_err(RunError::RuntimeError)?;

        let cancel = CancelToken::new();
        let on_interrupt = cancel.clone();
        rt.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; finishing in-flight attempts");
                on_interrupt.cancel();
            }
        });

        Ok(Self { rt, cancel })
    }

    fn run_config(
        &self,
        target: &TargetArgs,
        load: &LoadArgs,
        iterations: u64,
        duration: Duration,
    ) -> Result<RunConfig<HttpWorkFactory>, RunError> {
        let factory = HttpWorkFactory::new(
            self.rt.handle().clone(),
            request_template(target),
            Some(DEFAULT_CONNECT_TIMEOUT),
        )
        .map_err(|err| factory_error(&target.url, err))?;

        let mut cfg = RunConfig::new(factory, iterations)
            .with_duration(duration)
            .with_concurrency(load.concurrency)
            .with_throttle(load.throttle)
            .with_warming(load.warm)
            .with_reconnect(load.reconnect)
            .with_cancel(self.cancel.clone())
            .normalized();
        if let Some(status) = target.expect_status {
            cfg = cfg.with_classifier(expect_status(status));
        }

        tracing::debug!(?cfg, "run configured");
        Ok(cfg)
    }
}

/// Request-shape problems are the caller's input; anything else is the environment's.
fn factory_error(url: &str, err: restbench_http::Error) -> RunError {
    if err.is_configuration() {
        RunError::InvalidInput(anyhow::Error::new(err).context(format!("invalid target: {url}")))
    } else {
        RunError::RuntimeError(
            anyhow::Error::new(err).context(format!("failed to prepare requests to {url}")),
        )
    }
}

fn request_template(target: &TargetArgs) -> HttpRequest {
    let mut req = HttpRequest::new(target.method.clone(), target.url.clone())
        .with_timeout(target.timeout);
    for (name, value) in &target.headers {
        req = req.with_header(name.clone(), value.clone());
    }
    if let Some(body) = &target.body {
        req = req.with_body(body.clone());
    }
    if let Some(token) = &target.bearer {
        req = req.with_bearer(token);
    }
    req
}

fn execute<C: Collector>(
    cfg: &RunConfig<HttpWorkFactory>,
    collector: &C,
) -> Result<RunOutcome, RunError> {
    let quiet = QuietWorkerPanics::install();
    let outcome = restbench_core::run(cfg, collector);
    drop(quiet);
    let outcome = outcome
        .context("worker pool failed")
        .map_err(RunError::RuntimeError)?;

    if cfg.cancel.is_cancelled() {
        tracing::warn!(
            dropped = outcome.dropped_cancelled,
            "run cancelled; report covers completed attempts only"
        );
    }
    tracing::info!(
        executed = outcome.executed,
        dropped_deadline = outcome.dropped_deadline,
        warmups = outcome.warmups,
        "run finished"
    );
    Ok(outcome)
}
