//! # Benchmark Configuration
//!
//! Purpose: Describe one benchmark run (target, load shape, request shape)
//! and the per-worker share derived from it.
//!
//! ## Design Principles
//! 1. **Normalize Once**: Defaults and validation happen before workers spawn.
//! 2. **Value Semantics**: Worker plans are plain clones, no shared mutability.
//! 3. **Ceil Shares**: Connection and rate splits round up so the aggregate
//!    never falls below what was requested.

use std::time::Duration;

use crate::error::ConfigError;

/// Statuses counted as successful responses (fixed contract).
pub const SUCCESS_STATUSES: [u16; 7] = [200, 201, 202, 204, 301, 302, 304];

/// Upper bound on parallel workers regardless of CPU count.
pub const MAX_WORKERS: usize = 8;

/// HTTP method for the benchmarked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Parses a method token, case-insensitively.
    pub fn from_token(token: &str) -> Result<Self, ConfigError> {
        match token.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(ConfigError::InvalidMethod(other.to_string())),
        }
    }

    /// Wire token for the request line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// True for methods that conventionally carry a request body.
    pub fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

/// Parsed http target origin plus request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host name or address literal.
    pub host: String,
    /// TCP port (80 when the URL omits it).
    pub port: u16,
    /// Path including query, always starting with `/`.
    pub path: String,
    /// Original URL string as given on the command line.
    pub raw: String,
}

impl Target {
    /// Parses an `http://host[:port][/path]` URL.
    ///
    /// Only plain http is accepted; anything else is a configuration error.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let rest = match url.split_once("://") {
            Some(("http", rest)) => rest,
            Some((scheme, _)) => return Err(ConfigError::UnsupportedScheme(scheme.to_string())),
            None => return Err(ConfigError::InvalidUrl(url.to_string())),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
                (host, port)
            }
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        Ok(Target {
            host: host.to_string(),
            port,
            path: path.to_string(),
            raw: url.to_string(),
        })
    }

    /// `host:port` form used for connecting and the Host header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Host header value, omitting the default port.
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            self.authority()
        }
    }

    /// Absolute URI form used for HTTP/2 requests.
    pub fn absolute_uri(&self) -> String {
        format!("http://{}{}", self.host_header(), self.path)
    }
}

/// Immutable description of one benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    /// Target origin and path.
    pub target: Target,
    /// HTTP method.
    pub method: Method,
    /// Extra request headers in emit order.
    pub headers: Vec<(String, String)>,
    /// Opaque request body.
    pub body: Vec<u8>,
    /// Aggregate concurrency C.
    pub connections: u32,
    /// Measured run duration D.
    pub duration: Duration,
    /// Optional aggregate rate cap in requests per second.
    pub rate: Option<u32>,
    /// Per-request timeout T.
    pub timeout: Duration,
    /// Warmup window issued before the measured phase.
    pub warmup: Duration,
    /// Linear ramp window for connection starts and the rate cap.
    pub ramp_up: Duration,
    /// Prefer HTTP/2 over HTTP/1.1 keep-alive.
    pub http2: bool,
}

impl BenchConfig {
    /// Creates a configuration for `target` with the standard defaults:
    /// 50 connections, 10 s duration, 5000 ms timeout, GET, no warmup.
    pub fn new(target: Target) -> Self {
        BenchConfig {
            target,
            method: Method::Get,
            headers: Vec::new(),
            body: Vec::new(),
            connections: 50,
            duration: Duration::from_secs(10),
            rate: None,
            timeout: Duration::from_millis(5000),
            warmup: Duration::ZERO,
            ramp_up: Duration::ZERO,
            http2: false,
        }
    }

    /// Validates ranges that the flag layer cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections == 0 {
            return Err(ConfigError::InvalidField {
                field: "connections",
                reason: "must be at least 1",
            });
        }
        if self.duration.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "duration",
                reason: "must be positive",
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "timeout",
                reason: "must be positive",
            });
        }
        if self.rate == Some(0) {
            return Err(ConfigError::InvalidField {
                field: "rate",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Loop deadline seen by each worker: warmup plus measured duration.
    pub fn total_duration(&self) -> Duration {
        self.warmup + self.duration
    }
}

/// Per-worker share of a benchmark, sent with `Start`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPlan {
    /// Worker id in `0..worker_count`.
    pub worker_id: usize,
    /// This worker's connection share, `ceil(C / N)`.
    pub connections: u32,
    /// This worker's rate share, `ceil(R / N)` when a rate is set.
    pub rate: Option<u32>,
    /// Full run configuration, inherited by value.
    pub config: BenchConfig,
}

impl WorkerPlan {
    /// Splits `config` into `workers` equal ceil shares.
    ///
    /// The aggregate may exceed the requested totals by up to `workers - 1`,
    /// guaranteeing at least the requested concurrency and rate.
    pub fn split(config: &BenchConfig, workers: usize) -> Vec<WorkerPlan> {
        let workers = workers.max(1) as u32;
        let conn_share = config.connections.div_ceil(workers);
        let rate_share = config.rate.map(|r| r.div_ceil(workers));

        (0..workers as usize)
            .map(|worker_id| WorkerPlan {
                worker_id,
                connections: conn_share,
                rate: rate_share,
                config: config.clone(),
            })
            .collect()
    }
}
