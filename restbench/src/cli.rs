use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use restbench_core::{DEFAULT_BUCKET_COUNT, MAX_BUCKET_COUNT, ReportFormat};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    // A bare number means seconds.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m): {err}"))
}

fn parse_header(input: &str) -> Result<(String, String), String> {
    restbench_http::parse_header_spec(input).map_err(|err| err.to_string())
}

fn parse_method(input: &str) -> Result<http::Method, String> {
    http::Method::from_bytes(input.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid http method '{input}'"))
}

fn parse_bucket_count(input: &str) -> Result<usize, String> {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_BUCKET_COUNT).contains(&n) => Ok(n),
        _ => Err(format!("invalid bucket count '{input}' (expected 1..={MAX_BUCKET_COUNT})")),
    }
}

fn parse_report_format(input: &str) -> Result<ReportFormat, String> {
    input
        .parse()
        .map_err(|_| format!("invalid format '{input}' (expected table, csv or pretty-csv)"))
}

#[derive(Debug, Parser)]
#[command(
    name = "restbench",
    author,
    version,
    about = "Latency benchmarks and load runs against a REST endpoint",
    long_about = "restbench drives one HTTP request template from a fixed pool of worker threads.\n\n`bench` runs a fixed number of attempts and reports per-attempt latency statistics.\n`siege` runs for a wall-clock duration and reports throughput and error rates per time bucket.",
    after_help = "Examples:\n  restbench bench http://localhost:8080/health --iterations 100\n  restbench bench http://localhost:8080/items --concurrency 4 --format csv\n  restbench siege http://localhost:8080/items --duration 30s --concurrency 16 --detail\n  restbench siege https://example.com/ --header 'Accept: application/json' --expect-status 200"
)]
pub struct Cli {
    /// Log run lifecycle to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log everything, including per-attempt traces when RESTBENCH_LOG=trace
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Measure per-attempt latency over a fixed number of attempts
    Bench(BenchArgs),

    /// Measure throughput and error rates over a wall-clock window
    Siege(SiegeArgs),
}

#[derive(Debug, Args)]
pub struct BenchArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of attempts
    #[arg(long, short = 'n', default_value_t = 10)]
    pub iterations: u64,

    /// Stop starting new attempts after this long (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    #[command(flatten)]
    pub load: LoadArgs,

    #[command(flatten)]
    pub report: ReportArgs,
}

#[derive(Debug, Args)]
pub struct SiegeArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Upper bound on attempts (default: unbounded, the duration drives the run)
    #[arg(long, short = 'n')]
    pub iterations: Option<u64>,

    /// Length of the measured window (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub duration: Duration,

    /// Number of equal time buckets the window is split into
    #[arg(long, value_parser = parse_bucket_count, default_value_t = DEFAULT_BUCKET_COUNT)]
    pub buckets: usize,

    #[command(flatten)]
    pub load: LoadArgs,

    #[command(flatten)]
    pub report: ReportArgs,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Target URL (http:// or https://)
    pub url: String,

    /// HTTP method
    #[arg(long, short = 'X', value_parser = parse_method, default_value = "GET")]
    pub method: http::Method,

    /// Request header (repeatable, KEY:VALUE)
    #[arg(long = "header", short = 'H', value_name = "KEY:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body
    #[arg(long, short = 'd')]
    pub body: Option<String>,

    /// Bearer token sent as `Authorization: Bearer <token>`
    #[arg(long, env = "RESTBENCH_BEARER", hide_env_values = true)]
    pub bearer: Option<String>,

    /// Per-request timeout (e.g. 5s)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Treat exactly this status as success (default: only 200 succeeds)
    #[arg(long)]
    pub expect_status: Option<u16>,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Number of worker threads
    #[arg(long, short = 'c', default_value_t = 1)]
    pub concurrency: usize,

    /// Minimum delay before each attempt, overlapped with request setup (e.g. 100ms)
    #[arg(long, value_parser = parse_duration, default_value = "0ms")]
    pub throttle: Duration,

    /// Prime one connection per worker before measuring
    #[arg(long)]
    pub warm: bool,

    /// Open a fresh connection for every attempt
    #[arg(long)]
    pub reconnect: bool,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Label for the summary row (defaults to the target URL)
    #[arg(long)]
    pub label: Option<String>,

    /// Report format: table, csv or pretty-csv
    #[arg(long, value_parser = parse_report_format, default_value = "table")]
    pub format: ReportFormat,

    /// Omit the header row
    #[arg(long)]
    pub no_header: bool,

    /// Add per-attempt (bench) or per-bucket (siege) detail
    #[arg(long)]
    pub detail: bool,

    /// Show a progress indicator on stderr
    #[arg(long)]
    pub progress: bool,
}
