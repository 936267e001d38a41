//! Configuration errors surfaced before any worker is spawned.

use thiserror::Error;

/// Rejected configuration. All variants abort the run with exit code 2.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// URL could not be split into scheme, authority, and path.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Scheme other than plain http.
    #[error("unsupported url scheme `{0}`, only http targets are supported")]
    UnsupportedScheme(String),
    /// Method token outside the supported set.
    #[error("unsupported http method `{0}`")]
    InvalidMethod(String),
    /// Header flag missing the `Name: Value` shape.
    #[error("invalid header `{0}`, expected `Name: Value`")]
    InvalidHeader(String),
    /// Concurrency, duration, timeout, or rate outside its valid range.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}
