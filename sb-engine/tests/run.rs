use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use sb_common::{BenchConfig, Target};
use sb_engine::orchestrator;

/// Minimal keep-alive HTTP server answering every request with `response`.
/// Serves until the test process exits.
fn spawn_http_server(response: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            thread::spawn(move || serve_connection(stream, response));
        }
    });

    port
}

fn serve_connection(mut stream: TcpStream, response: &[u8]) {
    let _ = stream.set_nodelay(true);
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        head.clear();
        loop {
            match stream.read(&mut byte) {
                Ok(0) | Err(_) => return,
                Ok(_) => head.push(byte[0]),
            }
            if head.ends_with(b"\r\n\r\n") {
                break;
            }
        }
        if stream.write_all(response).is_err() {
            return;
        }
    }
}

fn short_config(port: u16, connections: u32) -> BenchConfig {
    let target = Target::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
    let mut config = BenchConfig::new(target);
    config.connections = connections;
    config.duration = Duration::from_secs(1);
    config.timeout = Duration::from_millis(1000);
    config
}

#[test]
fn fast_target_yields_a_clean_report() {
    let port = spawn_http_server(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
    let config = short_config(port, 4);

    let report = orchestrator::run(&config).expect("run");

    assert!(report.requests.total > 0);
    assert_eq!(report.requests.failed, 0);
    assert_eq!(
        report.requests.successful + report.requests.failed,
        report.requests.total
    );
    assert!(report.throughput.rps > 0.0);
    assert!(report.throughput.total_bytes > 0);
    assert_eq!(report.url, config.target.raw);
    assert_eq!(report.method, "GET");
    assert_eq!(report.duration, 1);
    assert_eq!(report.connections, 4);
    assert_eq!(report.rate, None);

    let lat = &report.latency;
    assert!(lat.min <= lat.p50);
    assert!(lat.p50 <= lat.p75);
    assert!(lat.p75 <= lat.p90);
    assert!(lat.p90 <= lat.p95);
    assert!(lat.p95 <= lat.p99);
    assert!(lat.p99 <= lat.p999);
    assert!(lat.p999 <= lat.max);
    assert!(lat.min <= lat.mean && lat.mean <= lat.max);
}

#[test]
fn single_connection_single_second_still_completes_requests() {
    let port = spawn_http_server(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let config = short_config(port, 1);

    let report = orchestrator::run(&config).expect("run");
    assert!(report.requests.total >= 1);
    assert_eq!(report.requests.failed, 0);
}

#[test]
fn failing_target_is_counted_per_status() {
    let port = spawn_http_server(
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\n\r\noops",
    );
    let config = short_config(port, 2);

    let report = orchestrator::run(&config).expect("run");

    assert!(report.requests.total > 0);
    assert_eq!(report.requests.successful, 0);
    assert_eq!(report.requests.failed, report.requests.total);
    assert_eq!(
        report.errors.by_status_code.get("500"),
        Some(&report.requests.total)
    );

    // No double counting across the failure categories.
    let status_sum: u64 = report.errors.by_status_code.values().sum();
    assert_eq!(
        report.errors.timeouts + report.errors.connection_errors + status_sum,
        report.requests.failed
    );
}

#[test]
fn unreachable_target_counts_connection_errors() {
    // Bind then drop so the port refuses connections.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let mut config = short_config(port, 2);
    // Refused connects return quickly; keep the failure volume bounded.
    config.rate = Some(40);

    let report = orchestrator::run(&config).expect("run");

    assert!(report.requests.total > 0);
    assert_eq!(report.requests.successful, 0);
    assert_eq!(report.errors.connection_errors, report.requests.failed);
    assert!(report.errors.by_status_code.is_empty());
}

#[test]
fn rate_cap_bounds_the_request_volume() {
    let port = spawn_http_server(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let mut config = short_config(port, 4);
    config.rate = Some(50);

    let report = orchestrator::run(&config).expect("run");

    assert!(report.requests.total >= 10, "got {}", report.requests.total);
    // One second at 50 req/s, allowing ceil-share rounding across workers
    // and scheduler jitter.
    assert!(
        report.requests.total <= 90,
        "rate cap leaked: {} requests",
        report.requests.total
    );
    assert_eq!(report.rate, Some(50));
}

#[test]
fn warmup_extends_the_issuing_window() {
    let port = spawn_http_server(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let mut config = short_config(port, 1);
    config.warmup = Duration::from_millis(300);

    let report = orchestrator::run(&config).expect("run");
    // Warmup samples are issued as normal requests and included by default.
    assert!(report.requests.total >= 1);
    assert_eq!(report.duration, 1);
}
