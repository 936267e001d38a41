//! # HTTP/2 Channel
//!
//! Purpose: Share one multiplexed HTTP/2 connection across all loop tasks of
//! a worker, one stream per request.
//!
//! The connection driver runs as a task on the worker's local set. A failed
//! stream tears the shared handle down; the next request reconnects.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Instant;

use bytes::Bytes;
use h2::client::SendRequest;
use tokio::net::TcpStream;
use tracing::debug;

use sb_common::Method;

use crate::client::{RequestError, RequestTemplate, Response};

/// Cloneable handle on a worker's shared HTTP/2 connection.
///
/// Single-threaded by construction: handles live on one worker's local set,
/// so the shared slot is a plain `Rc<RefCell>`.
#[derive(Clone, Default)]
pub struct H2Channel {
    session: Rc<RefCell<Option<SendRequest<Bytes>>>>,
}

impl H2Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues one request on its own stream under the template's timeout.
    pub async fn execute(&self, template: &RequestTemplate) -> Result<Response, RequestError> {
        let started = Instant::now();
        match tokio::time::timeout(template.timeout, self.attempt(template)).await {
            Ok(Ok((status, bytes))) => Ok(Response {
                status,
                bytes,
                latency_us: started.elapsed().as_micros() as u64,
            }),
            Ok(Err(err)) => {
                self.session.borrow_mut().take();
                Err(err)
            }
            // One slow stream does not invalidate the shared connection.
            Err(_) => Err(RequestError::Timeout),
        }
    }

    async fn attempt(&self, template: &RequestTemplate) -> Result<(u16, u64), RequestError> {
        let send = self.open_session(template).await?;
        let mut send = send.ready().await.map_err(h2_error)?;

        let request = build_request(template)?;
        let end_stream = template.body.is_empty();
        let (response, mut body_tx) = send.send_request(request, end_stream).map_err(h2_error)?;
        if !end_stream {
            body_tx.send_data(template.body.clone(), true).map_err(h2_error)?;
        }

        let response = response.await.map_err(h2_error)?;
        let status = response.status().as_u16();

        let mut body = response.into_body();
        let mut flow = body.flow_control().clone();
        let mut bytes = 0u64;
        while let Some(chunk) = body.data().await {
            let data = chunk.map_err(h2_error)?;
            bytes += data.len() as u64;
            let _ = flow.release_capacity(data.len());
        }

        Ok((status, bytes))
    }

    /// Returns the live session, establishing the connection on first use or
    /// after a failure tore it down.
    async fn open_session(&self, template: &RequestTemplate) -> Result<SendRequest<Bytes>, RequestError> {
        if let Some(send) = self.session.borrow().as_ref() {
            return Ok(send.clone());
        }

        let target = &template.target;
        let stream = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(RequestError::Connect)?;
        stream.set_nodelay(true).map_err(RequestError::Connect)?;

        let (send, connection) = h2::client::handshake(stream).await.map_err(h2_error)?;
        tokio::task::spawn_local(async move {
            if let Err(err) = connection.await {
                debug!(error = %err, "http/2 connection closed");
            }
        });

        *self.session.borrow_mut() = Some(send.clone());
        Ok(send)
    }
}

fn build_request(template: &RequestTemplate) -> Result<http::Request<()>, RequestError> {
    let uri: http::Uri = template
        .target
        .absolute_uri()
        .parse()
        .map_err(|_| RequestError::Protocol("invalid request uri"))?;

    let mut builder = http::Request::builder()
        .method(http_method(template.method))
        .uri(uri);
    for (name, value) in &template.headers {
        // :authority comes from the URI; a literal Host header is not
        // allowed on an HTTP/2 stream.
        if !name.eq_ignore_ascii_case("host") {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .body(())
        .map_err(|_| RequestError::Protocol("invalid request header"))
}

fn http_method(method: Method) -> http::Method {
    match method {
        Method::Get => http::Method::GET,
        Method::Post => http::Method::POST,
        Method::Put => http::Method::PUT,
        Method::Patch => http::Method::PATCH,
        Method::Delete => http::Method::DELETE,
        Method::Head => http::Method::HEAD,
        Method::Options => http::Method::OPTIONS,
    }
}

fn h2_error(err: h2::Error) -> RequestError {
    if err.is_io() {
        let io_err = err
            .into_io()
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "http/2 io error"));
        RequestError::Connect(io_err)
    } else {
        RequestError::Protocol("http/2 stream error")
    }
}
