//! # Snapshot Aggregator
//!
//! Purpose: Fold per-worker snapshots into one master histogram and one set
//! of totals. Every fold operation (histogram merge, counter addition, map
//! union) is commutative and associative, so any snapshot interleaving
//! across workers produces the same final result.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use sb_common::{ErrorTally, LatencyStats, RequestTotals, Throughput};

use crate::histogram::Histogram;
use crate::message::{LatencyData, MetricsSnapshot};

/// Running totals for one benchmark run.
#[derive(Debug, Default)]
pub struct Aggregator {
    master: Histogram,
    requests: u64,
    successes: u64,
    failures: u64,
    bytes: u64,
    timeouts: u64,
    connection_errors: u64,
    status_failures: HashMap<u16, u64>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one snapshot into the running totals.
    pub fn fold(&mut self, snapshot: MetricsSnapshot) {
        self.requests += snapshot.requests;
        self.successes += snapshot.successes;
        self.failures += snapshot.failures;
        self.bytes += snapshot.bytes;
        self.timeouts += snapshot.timeouts;
        self.connection_errors += snapshot.connection_errors;
        for (status, count) in snapshot.status_failures {
            *self.status_failures.entry(status).or_insert(0) += count;
        }
        match snapshot.latency {
            LatencyData::Delta(delta) => self.master.merge(&delta),
            LatencyData::Samples(samples) => {
                for sample in samples {
                    self.master.record(sample);
                }
            }
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn totals(&self) -> RequestTotals {
        RequestTotals {
            total: self.requests,
            successful: self.successes,
            failed: self.failures,
        }
    }

    /// Latency summary in milliseconds, two decimals.
    pub fn latency_stats(&self) -> LatencyStats {
        LatencyStats {
            min: us_to_ms(self.master.min() as f64),
            max: us_to_ms(self.master.max() as f64),
            mean: us_to_ms(self.master.mean()),
            stddev: us_to_ms(self.master.stddev()),
            p50: us_to_ms(self.master.percentile(50.0)),
            p75: us_to_ms(self.master.percentile(75.0)),
            p90: us_to_ms(self.master.percentile(90.0)),
            p95: us_to_ms(self.master.percentile(95.0)),
            p99: us_to_ms(self.master.percentile(99.0)),
            p999: us_to_ms(self.master.percentile(99.9)),
        }
    }

    pub fn error_tally(&self) -> ErrorTally {
        let by_status_code: BTreeMap<String, u64> = self
            .status_failures
            .iter()
            .map(|(status, count)| (status.to_string(), *count))
            .collect();
        ErrorTally {
            timeouts: self.timeouts,
            connection_errors: self.connection_errors,
            by_status_code,
        }
    }

    /// Throughput over the measured wall clock.
    pub fn throughput(&self, elapsed: Duration) -> Throughput {
        let secs = elapsed.as_secs_f64();
        let (rps, bytes_per_second) = if secs > 0.0 {
            (
                round2(self.requests as f64 / secs),
                round2(self.bytes as f64 / secs),
            )
        } else {
            (0.0, 0.0)
        };
        Throughput {
            rps,
            bytes_per_second,
            total_bytes: self.bytes,
        }
    }
}

fn us_to_ms(us: f64) -> f64 {
    round2(us / 1_000.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(worker_id: usize, latencies: &[u64], status: Option<u16>) -> MetricsSnapshot {
        let mut snap = MetricsSnapshot::empty(worker_id);
        let mut hist = Histogram::new();
        for &latency in latencies {
            hist.record(latency);
        }
        snap.requests = latencies.len() as u64;
        match status {
            Some(code) if !sb_common::is_success_status(code) => {
                snap.failures = snap.requests;
                snap.status_failures.insert(code, snap.requests);
            }
            _ => snap.successes = snap.requests,
        }
        snap.bytes = 100 * snap.requests;
        snap.latency = LatencyData::Delta(hist);
        snap
    }

    #[test]
    fn folds_counters_and_histograms() {
        let mut agg = Aggregator::new();
        agg.fold(snapshot(0, &[1_000, 2_000], None));
        agg.fold(snapshot(1, &[3_000], Some(500)));

        let totals = agg.totals();
        assert_eq!(totals.total, 3);
        assert_eq!(totals.successful, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.successful + totals.failed, totals.total);

        let errors = agg.error_tally();
        assert_eq!(errors.by_status_code.get("500"), Some(&1));
        let status_sum: u64 = errors.by_status_code.values().sum();
        assert_eq!(
            errors.timeouts + errors.connection_errors + status_sum,
            totals.failed
        );
    }

    #[test]
    fn snapshot_order_never_changes_the_result() {
        let snaps = vec![
            snapshot(0, &[1_000, 8_000, 2_000], None),
            snapshot(1, &[500], Some(503)),
            snapshot(2, &[90_000, 120_000], None),
            snapshot(0, &[4_000], Some(404)),
        ];

        let mut forward = Aggregator::new();
        for snap in snaps.clone() {
            forward.fold(snap);
        }
        let mut reversed = Aggregator::new();
        for snap in snaps.into_iter().rev() {
            reversed.fold(snap);
        }

        assert_eq!(forward.totals(), reversed.totals());
        assert_eq!(forward.latency_stats(), reversed.latency_stats());
        assert_eq!(forward.error_tally(), reversed.error_tally());
    }

    #[test]
    fn raw_samples_merge_like_deltas() {
        let mut via_delta = Aggregator::new();
        via_delta.fold(snapshot(0, &[1_000, 2_000, 3_000], None));

        let mut via_samples = Aggregator::new();
        let mut snap = MetricsSnapshot::empty(0);
        snap.requests = 3;
        snap.successes = 3;
        snap.bytes = 300;
        snap.latency = LatencyData::Samples(vec![1_000, 2_000, 3_000]);
        via_samples.fold(snap);

        assert_eq!(via_delta.latency_stats(), via_samples.latency_stats());
        assert_eq!(via_delta.totals(), via_samples.totals());
    }

    #[test]
    fn empty_run_reports_zeros() {
        let agg = Aggregator::new();
        let stats = agg.latency_stats();
        assert_eq!(stats.p50, 0.0);
        assert_eq!(stats.p999, 0.0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.stddev, 0.0);
        let throughput = agg.throughput(Duration::from_secs(10));
        assert_eq!(throughput.rps, 0.0);
        assert_eq!(throughput.total_bytes, 0);
    }

    #[test]
    fn percentile_ordering_holds_in_ms() {
        let mut agg = Aggregator::new();
        let latencies: Vec<u64> = (0..5_000u64).map(|i| (i * 611) % 2_000_000).collect();
        agg.fold(snapshot(0, &latencies, None));

        let stats = agg.latency_stats();
        assert!(stats.min <= stats.p50);
        assert!(stats.p50 <= stats.p75);
        assert!(stats.p75 <= stats.p90);
        assert!(stats.p90 <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert!(stats.p99 <= stats.p999);
        assert!(stats.min <= stats.mean && stats.mean <= stats.max);
    }

    #[test]
    fn throughput_divides_by_wall_clock() {
        let mut agg = Aggregator::new();
        agg.fold(snapshot(0, &[1_000; 100], None));
        let throughput = agg.throughput(Duration::from_secs(10));
        assert_eq!(throughput.rps, 10.0);
        assert_eq!(throughput.bytes_per_second, 1_000.0);
        assert_eq!(throughput.total_bytes, 10_000);
    }
}
