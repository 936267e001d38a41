//! JSON reporter: the §result-record contract, byte-stable through serde.

use sb_common::BenchReport;

/// A single run renders as one object, a compare run as an array.
pub fn render(reports: &[BenchReport]) -> String {
    let encoded = match reports {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    };
    encoded.expect("report serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::console::tests::sample_report;

    #[test]
    fn single_report_round_trips() {
        let report = sample_report("http://a");
        let rendered = render(std::slice::from_ref(&report));
        let decoded: BenchReport = serde_json::from_str(&rendered).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn multiple_reports_render_as_an_array() {
        let reports = vec![sample_report("http://a"), sample_report("http://b")];
        let rendered = render(&reports);
        let decoded: Vec<BenchReport> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(decoded, reports);
    }
}
