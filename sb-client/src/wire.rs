//! # HTTP/1.1 Wire Codec
//!
//! Purpose: Encode requests and parse response framing without external
//! dependencies, keeping allocations out of the per-request path.
//!
//! ## Design Principles
//! 1. **Encode Once**: The request is serialized a single time per run and
//!    replayed from the same buffer for every dispatch.
//! 2. **Incremental Parsing**: The head parser works on whatever bytes have
//!    arrived and reports "incomplete" instead of blocking.
//! 3. **Binary-Safe**: Bodies are counted, never interpreted.
//! 4. **Fail Fast**: Malformed framing surfaces a protocol error immediately.

use sb_common::{Method, Target};

/// Framing errors while parsing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Status line is not `HTTP/1.x NNN ...`.
    InvalidStatusLine,
    /// Header line is not `Name: Value` or carries an unparsable length.
    InvalidHeader,
    /// Chunk size line is not a hex length.
    InvalidChunk,
}

/// Parsed response head, up to and including the blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code from the status line.
    pub status: u16,
    /// Bytes consumed by the head, including the terminating CRLF pair.
    pub header_len: usize,
    /// `Content-Length` value when present.
    pub content_length: Option<u64>,
    /// `Transfer-Encoding: chunked` seen.
    pub chunked: bool,
    /// Connection must be dropped after this exchange.
    pub close: bool,
}

/// How the response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body follows the head.
    None,
    /// Exactly this many bytes follow.
    Length(u64),
    /// Chunked transfer coding.
    Chunked,
    /// Body runs until the server closes the connection.
    UntilClose,
}

impl ResponseHead {
    /// Resolves the body framing for this response.
    ///
    /// HEAD responses and 1xx/204/304 statuses never carry a body even when
    /// a Content-Length header is present.
    pub fn framing(&self, head_request: bool) -> BodyFraming {
        if head_request || self.status == 204 || self.status == 304 || self.status < 200 {
            return BodyFraming::None;
        }
        if self.chunked {
            BodyFraming::Chunked
        } else if let Some(len) = self.content_length {
            BodyFraming::Length(len)
        } else {
            BodyFraming::UntilClose
        }
    }
}

/// Serializes one request into `out`.
///
/// Host, User-Agent, and Content-Length are filled in unless the caller
/// supplied them; user headers are emitted in the order given.
pub fn encode_request(
    method: Method,
    target: &Target,
    headers: &[(String, String)],
    body: &[u8],
    out: &mut Vec<u8>,
) {
    out.clear();
    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.path.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");

    if !has_header(headers, "host") {
        push_header(out, "Host", &target.host_header());
    }
    if !has_header(headers, "user-agent") {
        push_header(out, "User-Agent", concat!("swiftbench/", env!("CARGO_PKG_VERSION")));
    }
    for (name, value) in headers {
        push_header(out, name, value);
    }
    if (!body.is_empty() || method.expects_body()) && !has_header(headers, "content-length") {
        push_header(out, "Content-Length", &body.len().to_string());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

/// Parses a response head from the front of `buf`.
///
/// Returns `Ok(None)` until the blank line has arrived.
pub fn parse_response_head(buf: &[u8]) -> Result<Option<ResponseHead>, WireError> {
    let header_len = match find_double_crlf(buf) {
        Some(len) => len,
        None => return Ok(None),
    };
    let head = &buf[..header_len - 2];

    let mut cursor = 0;
    let status_line = next_line(head, &mut cursor).ok_or(WireError::InvalidStatusLine)?;
    let (status, http10) = parse_status_line(status_line)?;

    let mut content_length = None;
    let mut chunked = false;
    let mut close_header = false;
    let mut keep_alive_header = false;

    while let Some(line) = next_line(head, &mut cursor) {
        if line.is_empty() {
            break;
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(WireError::InvalidHeader)?;
        let name = &line[..colon];
        let value = trim_ascii(&line[colon + 1..]);

        if name.eq_ignore_ascii_case(b"content-length") {
            content_length = Some(parse_decimal(value).ok_or(WireError::InvalidHeader)?);
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            chunked = contains_token(value, b"chunked");
        } else if name.eq_ignore_ascii_case(b"connection") {
            close_header = contains_token(value, b"close");
            keep_alive_header = contains_token(value, b"keep-alive");
        }
    }

    Ok(Some(ResponseHead {
        status,
        header_len,
        content_length,
        chunked,
        close: close_header || (http10 && !keep_alive_header),
    }))
}

/// Parses the chunk-size line at the front of `buf`.
///
/// Returns `(chunk size, bytes consumed by the line)`, or `Ok(None)` until
/// the full line has arrived. Chunk extensions after `;` are ignored.
pub fn parse_chunk_size(buf: &[u8]) -> Result<Option<(u64, usize)>, WireError> {
    let line_end = match find_crlf(buf) {
        Some(idx) => idx,
        None => return Ok(None),
    };
    let line = &buf[..line_end];
    let digits = match line.iter().position(|&b| b == b';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let digits = trim_ascii(digits);
    if digits.is_empty() {
        return Err(WireError::InvalidChunk);
    }

    let mut size: u64 = 0;
    for &b in digits {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(WireError::InvalidChunk),
        };
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(digit as u64))
            .ok_or(WireError::InvalidChunk)?;
    }
    Ok(Some((size, line_end + 2)))
}

/// Position just past `\r\n` of the first line, or `None` when incomplete.
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn next_line<'a>(head: &'a [u8], cursor: &mut usize) -> Option<&'a [u8]> {
    if *cursor > head.len() {
        return None;
    }
    let rest = &head[*cursor..];
    match find_crlf(rest) {
        Some(idx) => {
            *cursor += idx + 2;
            Some(&rest[..idx])
        }
        None => {
            *cursor = head.len() + 1;
            Some(rest)
        }
    }
}

fn parse_status_line(line: &[u8]) -> Result<(u16, bool), WireError> {
    if line.len() < 12 || !line.starts_with(b"HTTP/1.") {
        return Err(WireError::InvalidStatusLine);
    }
    let http10 = line[7] == b'0';
    if (line[7] != b'0' && line[7] != b'1') || line[8] != b' ' {
        return Err(WireError::InvalidStatusLine);
    }
    let digits = &line[9..12];
    if !digits.iter().all(|b| b.is_ascii_digit()) {
        return Err(WireError::InvalidStatusLine);
    }
    if line.len() > 12 && line[12] != b' ' {
        return Err(WireError::InvalidStatusLine);
    }
    let status = digits.iter().fold(0u16, |acc, &b| acc * 10 + (b - b'0') as u16);
    Ok((status, http10))
}

fn parse_decimal(data: &[u8]) -> Option<u64> {
    if data.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add((b - b'0') as u64)?;
    }
    Some(value)
}

fn trim_ascii(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !b.is_ascii_whitespace());
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace());
    match (start, end) {
        (Some(start), Some(end)) => &data[start..=end],
        _ => &[],
    }
}

fn contains_token(value: &[u8], token: &[u8]) -> bool {
    value
        .split(|&b| b == b',')
        .any(|part| trim_ascii(part).eq_ignore_ascii_case(token))
}
