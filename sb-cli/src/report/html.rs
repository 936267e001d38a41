//! HTML reporter: one self-contained page with the summary tables and the
//! raw JSON record embedded for tooling.

use std::fmt::Write;

use sb_common::BenchReport;

use crate::report::json;

pub fn render(reports: &[BenchReport]) -> String {
    let mut body = String::new();
    for report in reports {
        render_section(report, &mut body);
    }

    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
<title>swiftbench report</title>\n\
<style>\n\
body {{ font-family: sans-serif; margin: 2rem; color: #222; }}\n\
h2 {{ margin-bottom: 0.2rem; }}\n\
table {{ border-collapse: collapse; margin: 0.8rem 0 1.6rem; }}\n\
th, td {{ border: 1px solid #ccc; padding: 0.3rem 0.7rem; text-align: right; }}\n\
th {{ background: #f3f3f3; }}\n\
td:first-child, th:first-child {{ text-align: left; }}\n\
</style>\n</head>\n<body>\n<h1>swiftbench report</h1>\n{body}\
<script type=\"application/json\" id=\"result\">\n{json}\n</script>\n\
</body>\n</html>\n",
        body = body,
        json = json::render(reports),
    )
}

fn render_section(report: &BenchReport, out: &mut String) {
    let lat = &report.latency;
    let _ = write!(
        out,
        "<h2>{} {}</h2>\n<p>{} · {} s · {} connections</p>\n",
        escape(&report.method),
        escape(&report.url),
        escape(&report.timestamp),
        report.duration,
        report.connections,
    );
    let _ = write!(
        out,
        "<table>\n<tr><th>Requests</th><th>OK</th><th>Failed</th>\
<th>req/s</th><th>Bytes</th></tr>\n\
<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>\n</table>\n",
        report.requests.total,
        report.requests.successful,
        report.requests.failed,
        report.throughput.rps,
        report.throughput.total_bytes,
    );
    let _ = write!(
        out,
        "<table>\n<tr><th>Latency (ms)</th><th>min</th><th>mean</th><th>p50</th>\
<th>p90</th><th>p99</th><th>p99.9</th><th>max</th></tr>\n\
<tr><td></td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td>\
<td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>\n</table>\n",
        lat.min, lat.mean, lat.p50, lat.p90, lat.p99, lat.p999, lat.max,
    );
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
