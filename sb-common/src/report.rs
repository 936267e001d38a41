//! # Result Record
//!
//! Purpose: The stable, serializable contract handed to reporters once a run
//! completes. Key names are fixed; renaming any of them breaks downstream
//! consumers that gate CI on this document.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated outcome of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchReport {
    /// Target URL as given on the command line.
    pub url: String,
    /// HTTP method token.
    pub method: String,
    /// Configured duration in seconds.
    pub duration: u64,
    /// Configured aggregate concurrency.
    pub connections: u32,
    /// Configured rate cap, absent when the run was unlimited.
    pub rate: Option<u32>,
    /// Request totals.
    pub requests: RequestTotals,
    /// Observed throughput.
    pub throughput: Throughput,
    /// Latency distribution in milliseconds.
    pub latency: LatencyStats,
    /// Failure breakdown.
    pub errors: ErrorTally,
    /// ISO-8601 UTC completion timestamp.
    pub timestamp: String,
    /// Tool and environment identification.
    pub meta: Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTotals {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Throughput {
    /// Completed requests per second over the measured wall clock.
    pub rps: f64,
    pub bytes_per_second: f64,
    pub total_bytes: u64,
}

/// Latency summary in milliseconds, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTally {
    /// Requests that tripped the configured timeout.
    pub timeouts: u64,
    /// DNS, refused, reset, and protocol failures.
    pub connection_errors: u64,
    /// Failed responses keyed by status code rendered as a string.
    pub by_status_code: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Tool version.
    pub version: String,
    /// Runtime identifier. The key name is kept for compatibility with
    /// earlier consumers of this document.
    pub node_version: String,
    /// `os-arch` pair of the generating host.
    pub platform: String,
}

impl Meta {
    /// Collects tool and host identification for the current process.
    pub fn collect(version: &str, toolchain: &str) -> Self {
        Meta {
            version: version.to_string(),
            node_version: format!("rust-{toolchain}"),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// Current UTC instant in the timestamp format the record carries.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BenchReport {
        let mut by_status = BTreeMap::new();
        by_status.insert("500".to_string(), 3);
        BenchReport {
            url: "http://127.0.0.1:8080/".to_string(),
            method: "GET".to_string(),
            duration: 10,
            connections: 50,
            rate: None,
            requests: RequestTotals {
                total: 100,
                successful: 95,
                failed: 5,
            },
            throughput: Throughput {
                rps: 10.0,
                bytes_per_second: 1024.0,
                total_bytes: 10240,
            },
            latency: LatencyStats {
                min: 0.5,
                max: 12.5,
                mean: 2.0,
                stddev: 1.1,
                p50: 1.5,
                p75: 2.5,
                p90: 4.5,
                p95: 6.5,
                p99: 9.5,
                p999: 12.5,
            },
            errors: ErrorTally {
                timeouts: 1,
                connection_errors: 1,
                by_status_code: by_status,
            },
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
            meta: Meta::collect("0.1.0", "1.75"),
        }
    }

    #[test]
    fn json_round_trips() {
        let report = sample();
        let encoded = serde_json::to_string(&report).unwrap();
        let decoded: BenchReport = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn json_uses_contract_key_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("url").is_some());
        assert!(value["requests"].get("successful").is_some());
        assert!(value["throughput"].get("bytesPerSecond").is_some());
        assert!(value["throughput"].get("totalBytes").is_some());
        assert!(value["latency"].get("p999").is_some());
        assert!(value["errors"].get("connectionErrors").is_some());
        assert_eq!(value["errors"]["byStatusCode"]["500"], 3);
        assert!(value["meta"].get("nodeVersion").is_some());
        assert!(value["rate"].is_null());
    }

    #[test]
    fn timestamp_is_utc_iso8601() {
        let stamp = utc_timestamp();
        assert!(stamp.ends_with('Z'));
        assert!(stamp.contains('T'));
    }
}
