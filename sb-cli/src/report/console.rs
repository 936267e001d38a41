//! Console reporter: a compact human summary, one block per run plus a
//! side-by-side table when comparing.

use std::fmt::Write;

use sb_common::BenchReport;

use crate::compare;

pub fn render(reports: &[BenchReport]) -> String {
    let mut out = String::new();
    for report in reports {
        render_one(report, &mut out);
    }
    if reports.len() > 1 {
        out.push('\n');
        out.push_str(&compare::comparison_table(reports));
    }
    out
}

fn render_one(report: &BenchReport, out: &mut String) {
    let lat = &report.latency;
    let _ = writeln!(out, "{} {}", report.method, report.url);
    let _ = writeln!(
        out,
        "  Requests     {} total, {} ok, {} failed ({}s, {} connections{})",
        report.requests.total,
        report.requests.successful,
        report.requests.failed,
        report.duration,
        report.connections,
        match report.rate {
            Some(rate) => format!(", {rate} req/s cap"),
            None => String::new(),
        }
    );
    let _ = writeln!(
        out,
        "  Throughput   {:.2} req/s, {}/s ({} total)",
        report.throughput.rps,
        format_bytes(report.throughput.bytes_per_second),
        format_bytes(report.throughput.total_bytes as f64),
    );
    let _ = writeln!(
        out,
        "  Latency      min {:.2} ms, mean {:.2} ms, max {:.2} ms, stddev {:.2} ms",
        lat.min, lat.mean, lat.max, lat.stddev
    );
    let _ = writeln!(
        out,
        "  Percentiles  p50 {:.2}, p75 {:.2}, p90 {:.2}, p95 {:.2}, p99 {:.2}, p99.9 {:.2} (ms)",
        lat.p50, lat.p75, lat.p90, lat.p95, lat.p99, lat.p999
    );

    let errors = &report.errors;
    if report.requests.failed == 0 {
        let _ = writeln!(out, "  Errors       none");
    } else {
        let mut parts = vec![
            format!("{} timeouts", errors.timeouts),
            format!("{} connection errors", errors.connection_errors),
        ];
        for (status, count) in &errors.by_status_code {
            parts.push(format!("{count}x HTTP {status}"));
        }
        let _ = writeln!(out, "  Errors       {}", parts.join(", "));
    }
}

fn format_bytes(value: f64) -> String {
    if value >= 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} GB", value / (1024.0 * 1024.0 * 1024.0))
    } else if value >= 1024.0 * 1024.0 {
        format!("{:.2} MB", value / (1024.0 * 1024.0))
    } else if value >= 1024.0 {
        format!("{:.2} KB", value / 1024.0)
    } else {
        format!("{value:.0} B")
    }
}
