//! CSV reporter: one header row, one row per run. Column names reuse the
//! JSON contract keys flattened with dots.

use std::fmt::Write;

use sb_common::BenchReport;

const HEADER: &str = "url,method,duration,connections,rate,\
requests.total,requests.successful,requests.failed,\
throughput.rps,throughput.bytesPerSecond,throughput.totalBytes,\
latency.min,latency.max,latency.mean,latency.stddev,\
latency.p50,latency.p75,latency.p90,latency.p95,latency.p99,latency.p999,\
errors.timeouts,errors.connectionErrors,timestamp";

pub fn render(reports: &[BenchReport]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for report in reports {
        let lat = &report.latency;
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            quote(&report.url),
            report.method,
            report.duration,
            report.connections,
            report
                .rate
                .map(|r| r.to_string())
                .unwrap_or_default(),
            report.requests.total,
            report.requests.successful,
            report.requests.failed,
            report.throughput.rps,
            report.throughput.bytes_per_second,
            report.throughput.total_bytes,
            lat.min,
            lat.max,
            lat.mean,
            lat.stddev,
            lat.p50,
            lat.p75,
            lat.p90,
            lat.p95,
            lat.p99,
            lat.p999,
            report.errors.timeouts,
            report.errors.connection_errors,
            report.timestamp,
        );
    }
    out
}

/// Quotes a field when it could break the row shape.
fn quote(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
