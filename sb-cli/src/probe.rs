//! Pre-flight reachability probe: one HEAD request before any worker
//! spawns. Any intact HTTP response, whatever the status, proves the target
//! reachable; only transport failures abort the run.

use std::time::Duration;

use tracing::debug;

use sb_client::{Http1Connection, RequestError, RequestTemplate};
use sb_common::{BenchConfig, Method};

/// Probes never wait longer than this, even with a generous run timeout.
const PROBE_TIMEOUT_CAP: Duration = Duration::from_secs(3);

/// Checks that the target answers at all.
pub fn probe(config: &BenchConfig) -> Result<(), RequestError> {
    let mut probe_config = config.clone();
    probe_config.method = Method::Head;
    probe_config.body = Vec::new();
    probe_config.http2 = false;
    probe_config.timeout = config.timeout.min(PROBE_TIMEOUT_CAP);
    let template = RequestTemplate::build(&probe_config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RequestError::Connect)?;

    runtime.block_on(async {
        let mut conn = Http1Connection::new();
        let response = conn.execute(&template).await?;
        debug!(
            url = %config.target.raw,
            status = response.status,
            "probe succeeded"
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use sb_common::Target;

    #[test]
    fn reachable_target_passes_even_with_an_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(b"HTTP/1.1 503 Unavailable\r\nContent-Length: 0\r\n\r\n");
        });

        let config = BenchConfig::new(Target::parse(&format!("http://127.0.0.1:{port}/")).unwrap());
        assert!(probe(&config).is_ok());
    }

    #[test]
    fn refused_port_fails_the_probe() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let config = BenchConfig::new(Target::parse(&format!("http://127.0.0.1:{port}/")).unwrap());
        assert!(probe(&config).is_err());
    }
}
