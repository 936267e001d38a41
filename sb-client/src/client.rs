//! # HTTP/1.1 Requester
//!
//! Purpose: Drive one persistent keep-alive connection per loop task and
//! measure client-observed latency for every exchange.
//!
//! ## Design Principles
//! 1. **Connection Reuse**: Connect lazily, keep the socket across requests,
//!    drop it on any error or a `Connection: close` response.
//! 2. **Buffer Reuse**: One read buffer per connection, cleared per exchange.
//! 3. **Bounded Work**: The whole exchange runs under the configured timeout.
//! 4. **Errors Are Data**: Non-success statuses are returned, not raised.

use std::io;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use sb_common::{BenchConfig, Method, Target};

use crate::h2c::H2Channel;
use crate::wire::{self, BodyFraming, WireError};

/// Request failure kinds, distinct from HTTP-level failure statuses.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The configured per-request timeout tripped.
    #[error("request timed out")]
    Timeout,
    /// DNS, refused, reset, or the peer closed mid-exchange.
    #[error("connection error: {0}")]
    Connect(#[source] io::Error),
    /// The peer answered with something that is not HTTP.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout)
    }
}

impl From<WireError> for RequestError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::InvalidStatusLine => RequestError::Protocol("invalid status line"),
            WireError::InvalidHeader => RequestError::Protocol("invalid response header"),
            WireError::InvalidChunk => RequestError::Protocol("invalid chunk framing"),
        }
    }
}

/// One completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Bytes received for this response (head and body).
    pub bytes: u64,
    /// Wall clock from just before dispatch to after the body was consumed.
    pub latency_us: u64,
}

/// Immutable request description shared by every task of a worker.
///
/// The HTTP/1.1 byte form is encoded once here and replayed per dispatch.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub target: Target,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
    encoded: Vec<u8>,
}

impl RequestTemplate {
    /// Builds the template for a run configuration.
    pub fn build(config: &BenchConfig) -> Self {
        let mut encoded = Vec::with_capacity(256 + config.body.len());
        wire::encode_request(
            config.method,
            &config.target,
            &config.headers,
            &config.body,
            &mut encoded,
        );
        RequestTemplate {
            target: config.target.clone(),
            method: config.method,
            headers: config.headers.clone(),
            body: Bytes::from(config.body.clone()),
            timeout: config.timeout,
            encoded,
        }
    }

    /// Serialized HTTP/1.1 request bytes.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }
}

/// Per-task requester, either a private HTTP/1.1 connection or a handle on
/// the worker's shared HTTP/2 connection.
pub enum HttpClient {
    H1(Http1Connection),
    H2(H2Channel),
}

impl HttpClient {
    /// Picks the transport for `config`; `channel` is the worker's shared
    /// HTTP/2 connection when `--http2` was requested.
    pub fn new(config: &BenchConfig, channel: Option<&H2Channel>) -> Self {
        match channel {
            Some(channel) if config.http2 => HttpClient::H2(channel.clone()),
            _ => HttpClient::H1(Http1Connection::new()),
        }
    }

    /// Issues one request and fully consumes the response.
    pub async fn execute(&mut self, template: &RequestTemplate) -> Result<Response, RequestError> {
        match self {
            HttpClient::H1(conn) => conn.execute(template).await,
            HttpClient::H2(channel) => channel.execute(template).await,
        }
    }
}

/// A single keep-alive HTTP/1.1 connection with a reusable read buffer.
pub struct Http1Connection {
    stream: Option<TcpStream>,
    buf: BytesMut,
}

impl Http1Connection {
    pub fn new() -> Self {
        Http1Connection {
            stream: None,
            buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// Executes one exchange under the template's timeout.
    ///
    /// Latency covers connect (when needed), dispatch, and the full body
    /// read. The connection is dropped on any error so the next call starts
    /// clean.
    pub async fn execute(&mut self, template: &RequestTemplate) -> Result<Response, RequestError> {
        let started = Instant::now();
        match tokio::time::timeout(template.timeout, self.attempt(template)).await {
            Ok(Ok((status, bytes, close))) => {
                if close {
                    self.stream = None;
                }
                Ok(Response {
                    status,
                    bytes,
                    latency_us: started.elapsed().as_micros() as u64,
                })
            }
            Ok(Err(err)) => {
                self.stream = None;
                Err(err)
            }
            Err(_) => {
                self.stream = None;
                Err(RequestError::Timeout)
            }
        }
    }

    async fn attempt(&mut self, template: &RequestTemplate) -> Result<(u16, u64, bool), RequestError> {
        let reused = self.stream.is_some();
        match self.round_trip(template).await {
            // A keep-alive connection the server already closed fails on the
            // first reuse before any response bytes arrive. Retry once on a
            // fresh connection; genuine failures repeat there.
            Err(RequestError::Connect(_)) if reused && self.buf.is_empty() => {
                self.stream = None;
                self.round_trip(template).await
            }
            other => other,
        }
    }

    async fn round_trip(&mut self, template: &RequestTemplate) -> Result<(u16, u64, bool), RequestError> {
        if self.stream.is_none() {
            let target = &template.target;
            let stream = TcpStream::connect((target.host.as_str(), target.port))
                .await
                .map_err(RequestError::Connect)?;
            // Disable Nagle to keep request latency low for small payloads.
            stream.set_nodelay(true).map_err(RequestError::Connect)?;
            self.stream = Some(stream);
        }
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(RequestError::Protocol("connection missing")),
        };
        let buf = &mut self.buf;
        buf.clear();

        stream
            .write_all(template.encoded())
            .await
            .map_err(RequestError::Connect)?;

        let head = loop {
            if let Some(head) = wire::parse_response_head(buf)? {
                break head;
            }
            fill(stream, buf).await?;
        };
        buf.advance(head.header_len);

        let body_bytes = match head.framing(template.method == Method::Head) {
            BodyFraming::None => 0,
            BodyFraming::Length(len) => {
                consume(stream, buf, len).await?;
                len
            }
            BodyFraming::Chunked => read_chunked(stream, buf).await?,
            BodyFraming::UntilClose => {
                let mut total = buf.len() as u64;
                buf.clear();
                loop {
                    let read = stream.read_buf(buf).await.map_err(RequestError::Connect)?;
                    if read == 0 {
                        break;
                    }
                    total += read as u64;
                    buf.clear();
                }
                return Ok((head.status, head.header_len as u64 + total, true));
            }
        };

        Ok((
            head.status,
            head.header_len as u64 + body_bytes,
            head.close,
        ))
    }
}

impl Default for Http1Connection {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads at least one more byte into `buf`; EOF mid-response is an error.
async fn fill(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<(), RequestError> {
    let read = stream.read_buf(buf).await.map_err(RequestError::Connect)?;
    if read == 0 {
        return Err(RequestError::Connect(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "server closed the connection mid-response",
        )));
    }
    Ok(())
}

/// Discards exactly `len` body bytes without growing the buffer.
async fn consume(stream: &mut TcpStream, buf: &mut BytesMut, len: u64) -> Result<(), RequestError> {
    let mut remaining = len;
    loop {
        let take = (buf.len() as u64).min(remaining) as usize;
        buf.advance(take);
        remaining -= take as u64;
        if remaining == 0 {
            return Ok(());
        }
        fill(stream, buf).await?;
    }
}

/// Consumes a chunked body and returns the payload byte count.
async fn read_chunked(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<u64, RequestError> {
    let mut payload = 0u64;
    loop {
        let (size, line_len) = loop {
            if let Some(parsed) = wire::parse_chunk_size(buf)? {
                break parsed;
            }
            fill(stream, buf).await?;
        };
        buf.advance(line_len);

        if size == 0 {
            // Trailer section: discard lines up to the terminating blank one.
            loop {
                match wire::find_crlf(buf) {
                    Some(0) => {
                        buf.advance(2);
                        return Ok(payload);
                    }
                    Some(len) => buf.advance(len + 2),
                    None => fill(stream, buf).await?,
                }
            }
        }

        // Chunk payload plus its trailing CRLF.
        consume(stream, buf, size + 2).await?;
        payload += size;
    }
}
