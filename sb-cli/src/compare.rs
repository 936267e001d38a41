//! Compare mode: sequential runs over several URLs, summarized side by side.
//! Only the result records are consumed here; the engine is unaware of it.

use std::fmt::Write;

use sb_common::BenchReport;

/// Plain-text comparison table for two or more runs.
pub fn comparison_table(reports: &[BenchReport]) -> String {
    let url_width = reports
        .iter()
        .map(|r| r.url.len())
        .max()
        .unwrap_or(0)
        .max("Comparison".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<url_width$}  {:>10}  {:>9}  {:>9}  {:>9}  {:>8}",
        "Comparison", "req/s", "p50 ms", "p99 ms", "max ms", "failed"
    );
    for report in reports {
        let _ = writeln!(
            out,
            "{:<url_width$}  {:>10.2}  {:>9.2}  {:>9.2}  {:>9.2}  {:>8}",
            report.url,
            report.throughput.rps,
            report.latency.p50,
            report.latency.p99,
            report.latency.max,
            report.requests.failed,
        );
    }

    if let Some(fastest) = reports
        .iter()
        .max_by(|a, b| a.throughput.rps.total_cmp(&b.throughput.rps))
    {
        let _ = writeln!(
            out,
            "Fastest: {} at {:.2} req/s",
            fastest.url, fastest.throughput.rps
        );
    }
    out
}
