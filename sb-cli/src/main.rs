//! # swiftbench
//!
//! Closed-loop HTTP load generator. Parses the flag surface, probes the
//! target, hands the run to the engine, renders the result record, and
//! turns thresholds into exit codes:
//! 0 success, 1 threshold exceeded, 2 configuration or run failure.

mod args;
mod compare;
mod probe;
mod report;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sb_common::BenchReport;

use crate::args::Args;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let code = match execute(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("swiftbench: {err:#}");
            2
        }
    };
    std::process::exit(code);
}

fn execute(args: &Args) -> anyhow::Result<i32> {
    let configs = args.to_configs()?;

    // Reachability gate: fail fast, before any load and before any report
    // file is written.
    for config in &configs {
        probe::probe(config)
            .with_context(|| format!("target {} is unreachable", config.target.raw))?;
    }

    let mut reports = Vec::with_capacity(configs.len());
    for config in &configs {
        let report = sb_engine::run(config)
            .with_context(|| format!("benchmark of {} failed", config.target.raw))?;
        reports.push(report);
    }

    let rendered = report::render(&reports, args.output);
    match &args.output_file {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("cannot write report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{rendered}"),
    }

    let mut code = 0;
    for report in &reports {
        if let Some(reason) = threshold_breach(args.p99, args.error_rate, report) {
            eprintln!("swiftbench: {}: {reason}", report.url);
            code = 1;
        }
    }
    Ok(code)
}

/// Evaluates the CI gates against one result record: p99 first, then error
/// rate, both strict comparisons.
fn threshold_breach(
    p99_limit: Option<f64>,
    error_rate_limit: Option<f64>,
    report: &BenchReport,
) -> Option<String> {
    if let Some(limit) = p99_limit {
        if report.latency.p99 > limit {
            return Some(format!(
                "p99 threshold exceeded ({:.2} ms > {limit} ms)",
                report.latency.p99
            ));
        }
    }
    if let Some(limit) = error_rate_limit {
        let fraction = if report.requests.total == 0 {
            0.0
        } else {
            report.requests.failed as f64 / report.requests.total as f64
        };
        if fraction > limit {
            return Some(format!(
                "error-rate threshold exceeded ({fraction:.4} > {limit})"
            ));
        }
    }
    None
}
