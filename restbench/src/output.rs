use anyhow::Context as _;
use restbench_core::{DumpOptions, Report};

use crate::cli::ReportArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;

mod progress;

pub(crate) use progress::ProgressCollector;

pub(crate) fn dump_options(args: &ReportArgs) -> DumpOptions {
    DumpOptions {
        format: args.format,
        header: !args.no_header,
    }
}

/// Prints the report to stdout and maps its totals to an exit code.
pub(crate) fn print_report<R: Report>(
    report: &R,
    args: &ReportArgs,
    default_label: &str,
) -> Result<ExitCode, RunError> {
    let label = args.label.as_deref().unwrap_or(default_label);
    report
        .dump(label, &dump_options(args), args.detail)
        .context("failed to write report")
        .map_err(RunError::RuntimeError)?;

    let totals = report.totals();
    tracing::info!(
        attempts = totals.attempts,
        failures = totals.failures,
        "report written"
    );
    Ok(ExitCode::from_totals(totals))
}
