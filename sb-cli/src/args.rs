//! # Command-Line Surface
//!
//! Flag parsing and its translation into validated run configurations.
//! Anything clap cannot express (header shape, method tokens, url schemes,
//! compare arity) is rejected here, before any worker spawns.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use sb_common::{BenchConfig, ConfigError, Method, Target};

use crate::report::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "swiftbench",
    version,
    disable_version_flag = true,
    about = "Closed-loop HTTP load generator with latency percentiles and CI thresholds"
)]
pub struct Args {
    /// Target URL (two or more with --compare)
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Aggregate concurrency
    #[arg(short, long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    pub connections: u32,

    /// Test duration in seconds
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub duration: u64,

    /// Cap the aggregate request rate (req/s)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub rate: Option<u32>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Ramp connection starts and the rate cap up over this many seconds
    #[arg(long = "ramp-up", default_value_t = 0, value_name = "SECONDS")]
    pub ramp_up: u64,

    /// Issue load for this many seconds before the measured window
    #[arg(long, default_value_t = 0, value_name = "SECONDS")]
    pub warmup: u64,

    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// Add a request header as 'Name: Value' (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Raw request body
    #[arg(long)]
    pub body: Option<String>,

    /// JSON request body; also sets Content-Type: application/json
    #[arg(long, conflicts_with = "body")]
    pub json: Option<String>,

    /// Prefer HTTP/2 over HTTP/1.1 keep-alive
    #[arg(long)]
    pub http2: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub output: OutputFormat,

    /// Write the rendered report to a file instead of stdout
    #[arg(short = 'o', value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Exit 1 when p99 latency in milliseconds exceeds this
    #[arg(long, value_name = "MS")]
    pub p99: Option<f64>,

    /// Exit 1 when failed/total exceeds this fraction
    #[arg(long = "error-rate", value_name = "FRACTION", value_parser = parse_fraction)]
    pub error_rate: Option<f64>,

    /// Benchmark every URL sequentially and compare the results
    #[arg(long)]
    pub compare: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

impl Args {
    /// Builds one validated configuration per benchmarked URL.
    pub fn to_configs(&self) -> Result<Vec<BenchConfig>, ConfigError> {
        if self.compare && self.urls.len() < 2 {
            return Err(ConfigError::InvalidField {
                field: "compare",
                reason: "requires at least two urls",
            });
        }
        if !self.compare && self.urls.len() > 1 {
            return Err(ConfigError::InvalidField {
                field: "url",
                reason: "multiple urls require --compare",
            });
        }

        let method = Method::from_token(&self.method)?;
        let mut headers = Vec::with_capacity(self.headers.len());
        for raw in &self.headers {
            headers.push(parse_header(raw)?);
        }

        let body = match (&self.json, &self.body) {
            (Some(json), _) => {
                if !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("content-type")) {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                json.clone().into_bytes()
            }
            (None, Some(body)) => body.clone().into_bytes(),
            (None, None) => Vec::new(),
        };

        let mut configs = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            let mut config = BenchConfig::new(Target::parse(url)?);
            config.method = method;
            config.headers = headers.clone();
            config.body = body.clone();
            config.connections = self.connections;
            config.duration = Duration::from_secs(self.duration);
            config.rate = self.rate;
            config.timeout = Duration::from_millis(self.timeout);
            config.warmup = Duration::from_secs(self.warmup);
            config.ramp_up = Duration::from_secs(self.ramp_up);
            config.http2 = self.http2;
            config.validate()?;
            configs.push(config);
        }
        Ok(configs)
    }
}

/// Splits `Name: Value`, trimming whitespace around both parts.
fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidHeader(raw.to_string()))?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        return Err(ConfigError::InvalidHeader(raw.to_string()));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_fraction(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("`{raw}` is not in [0, 1]"));
    }
    Ok(value)
}
