//! Transports: the network side of the cache.
//!
//! The cache only needs one capability from the network: turn a [`Request`]
//! into a [`Response`]. Anything implementing [`Transport`] can sit behind a
//! [`Client`](crate::client::Client):
//!
//! - [`TcpTransport`] speaks plain HTTP/1.1 over a fresh TCP connection per
//!   request;
//! - any `Fn(Request) -> impl Future<Output = Result<Response, TransportError>>`
//!   closure is a transport as well, which keeps fakes in tests short.

use std::future::Future;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf, Take};
use tokio::net::TcpStream;
use tracing::debug;

use crate::http::response::ResponseError;
use crate::http::{Body, Method, Request, Response, StatusCode};
use crate::store::BoxFuture;

/// Default upper bound on the size of a response head (64 KiB).
pub const DEFAULT_MAX_HEAD_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Errors produced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported URL scheme for this transport: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("request URL has no host")]
    MissingHost,

    #[error("invalid response: {0}")]
    InvalidResponse(#[from] ResponseError),

    #[error("invalid chunked body encoding")]
    InvalidChunk,

    #[error("response head exceeds maximum allowed size of {max_bytes} bytes")]
    HeadTooLarge { max_bytes: usize },

    #[error("connection closed before the response was complete")]
    Truncated,

    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wraps an arbitrary error raised by a custom transport.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }
}

/// Performs HTTP exchanges on behalf of the cache.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one transport is shared by
///   every call made through a client.
/// - The returned response body may be a stream; the cache buffers it.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and returns the origin's response.
    fn perform(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>>;
}

impl<T, F> Transport for T
where
    T: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    fn perform(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin((self)(request))
    }
}

/// Plain HTTP/1.1 over TCP, one connection per request.
///
/// Requests are sent with `Connection: close`. Response bodies delimited by
/// `Content-Length` or by connection close are returned as streams; chunked
/// bodies are decoded eagerly. `https` URLs are rejected.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    max_head_size: usize,
    user_agent: Option<String>,
}

impl TcpTransport {
    /// Creates a transport with default limits and no `User-Agent`.
    pub fn new() -> Self {
        Self {
            max_head_size: DEFAULT_MAX_HEAD_SIZE,
            user_agent: None,
        }
    }

    /// Sets the maximum accepted response head size.
    #[must_use]
    pub fn max_head_size(mut self, max_bytes: usize) -> Self {
        self.max_head_size = max_bytes;
        self
    }

    /// Sends this `User-Agent` on requests that do not set one.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    async fn exchange(&self, mut request: Request) -> Result<Response, TransportError> {
        let url = request.url();
        if url.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }
        let host = url.host_str().ok_or(TransportError::MissingHost)?.to_owned();
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{host}:{port}");

        if let Some(agent) = &self.user_agent {
            if !request.headers().contains("user-agent") {
                request.headers_mut().append("User-Agent", agent.clone());
            }
        }

        // IPv6 literals come back bracketed from host_str.
        let connect_host = host.trim_start_matches('[').trim_end_matches(']');
        let mut stream = TcpStream::connect((connect_host, port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;
        debug!(%addr, method = %request.method(), target = %request.request_target(), "sending request");

        stream.write_all(&request.to_wire()).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        let (mut response, body_offset) = loop {
            match Response::parse_head(&buf) {
                Ok((_, body_offset)) if body_offset > self.max_head_size => {
                    return Err(TransportError::HeadTooLarge {
                        max_bytes: self.max_head_size,
                    });
                }
                Ok((interim, body_offset))
                    if interim.status().is_informational()
                        && interim.status() != StatusCode::SWITCHING_PROTOCOLS =>
                {
                    debug!(%addr, status = %interim.status(), "skipping interim response");
                    let _ = buf.split_to(body_offset);
                    continue;
                }
                Ok(parsed) => break parsed,
                Err(ResponseError::Incomplete) => {}
                Err(e) => return Err(e.into()),
            }
            if buf.len() > self.max_head_size {
                return Err(TransportError::HeadTooLarge {
                    max_bytes: self.max_head_size,
                });
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(TransportError::Truncated);
            }
        };
        let leftover = buf.split_off(body_offset).freeze();
        debug!(%addr, status = %response.status(), "response head received");

        let status = response.status();
        let body = if *request.method() == Method::Head || status.forbids_body() {
            Body::empty()
        } else if response.headers().is_chunked() {
            let mut raw = leftover.to_vec();
            stream.read_to_end(&mut raw).await?;
            Body::Full(decode_chunked(&raw)?)
        } else if let Some(length) = response.headers().content_length() {
            Body::from_reader(ExactLength::new(Cursor::new(leftover).chain(stream), length))
        } else {
            Body::from_reader(Cursor::new(leftover).chain(stream))
        };

        *response.body_mut() = body;
        Ok(response)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn perform(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(self.exchange(request))
    }
}

/// A `Content-Length` body: stops after `length` bytes and fails with
/// `UnexpectedEof` if the connection closes first.
struct ExactLength<R> {
    inner: Take<R>,
}

impl<R: AsyncRead + Unpin> ExactLength<R> {
    fn new(inner: R, length: u64) -> Self {
        Self {
            inner: inner.take(length),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ExactLength<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;
        let missing = self.inner.limit();
        if buf.filled().len() == before && buf.remaining() > 0 && missing > 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed {missing} bytes short of Content-Length"),
            )));
        }
        Poll::Ready(Ok(()))
    }
}

/// Decodes a complete `Transfer-Encoding: chunked` body. Trailers are ignored.
fn decode_chunked(mut raw: &[u8]) -> Result<Bytes, TransportError> {
    let mut out = BytesMut::with_capacity(raw.len());
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(raw) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(TransportError::Truncated),
            Err(_) => return Err(TransportError::InvalidChunk),
        };
        raw = &raw[consumed..];
        if size == 0 {
            return Ok(out.freeze());
        }
        let size = usize::try_from(size).map_err(|_| TransportError::InvalidChunk)?;
        if raw.len() < size + 2 {
            return Err(TransportError::Truncated);
        }
        out.extend_from_slice(&raw[..size]);
        if &raw[size..size + 2] != b"\r\n" {
            return Err(TransportError::InvalidChunk);
        }
        raw = &raw[size + 2..];
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::net::TcpListener;

    use super::*;

    /// Serves one connection: captures the request head, then writes `reply`.
    async fn origin(reply: &'static [u8]) -> (SocketAddr, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received: Vec<u8> = Vec::new();
            let mut chunk = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(received).unwrap()
        });
        (addr, handle)
    }

    fn get(addr: SocketAddr, path: &str) -> Request {
        Request::get(&format!("http://{addr}{path}")).unwrap()
    }

    #[tokio::test]
    async fn content_length_body() {
        let (addr, server) =
            origin(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello-and-junk").await;
        let transport = TcpTransport::new().user_agent("httpcache-test");

        let mut response = transport.perform(get(addr, "/greeting.txt?x=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.body_ref().is_buffered());
        assert_eq!(response.text().await.unwrap(), "hello");

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /greeting.txt?x=1 HTTP/1.1\r\n"));
        assert!(head.contains(&format!("Host: {addr}\r\n")));
        assert!(head.contains("User-Agent: httpcache-test\r\n"));
        assert!(head.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn close_delimited_body() {
        let (addr, _server) = origin(b"HTTP/1.0 404 Not Found\r\n\r\nmissing").await;
        let mut response = TcpTransport::new().perform(get(addr, "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.text().await.unwrap(), "missing");
    }

    #[tokio::test]
    async fn chunked_body() {
        let (addr, _server) = origin(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: y\r\n\r\n",
        )
        .await;
        let mut response = TcpTransport::new().perform(get(addr, "/")).await.unwrap();
        assert!(response.body_ref().is_buffered());
        assert_eq!(response.text().await.unwrap(), "Wikipedia");
    }

    #[tokio::test]
    async fn no_content_has_empty_body() {
        let (addr, _server) = origin(b"HTTP/1.1 204 No Content\r\n\r\n").await;
        let mut response = TcpTransport::new().perform(get(addr, "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_content_length_body_fails() {
        crate::test_support::init_tracing();
        let (addr, _server) =
            origin(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nabc").await;
        let mut response = TcpTransport::new().perform(get(addr, "/short.bin")).await.unwrap();
        let err = response.bytes().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn interim_heads_are_skipped() {
        let (addr, _server) = origin(
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </a.css>\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        )
        .await;
        let mut response = TcpTransport::new().perform(get(addr, "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains("link"));
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn truncated_head() {
        let (addr, _server) = origin(b"HTTP/1.1 200 OK\r\nContent-").await;
        let err = TcpTransport::new().perform(get(addr, "/")).await.unwrap_err();
        assert!(matches!(err, TransportError::Truncated), "{err}");
    }

    #[tokio::test]
    async fn oversized_head() {
        let (addr, _server) =
            origin(b"HTTP/1.1 200 OK\r\nX-Padding: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n").await;
        let err = TcpTransport::new()
            .max_head_size(16)
            .perform(get(addr, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::HeadTooLarge { max_bytes: 16 }));
    }

    #[tokio::test]
    async fn https_is_rejected() {
        let request = Request::get("https://example.com/").unwrap();
        let err = TcpTransport::new().perform(request).await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme { .. }));
    }

    #[tokio::test]
    async fn refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = TcpTransport::new().perform(get(addr, "/")).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn closures_are_transports() {
        let transport = |request: Request| async move {
            Ok::<_, TransportError>(Response::new(StatusCode::OK).body(request.path().to_owned()))
        };
        let mut response = transport
            .perform(Request::get("http://example.com/echo").unwrap())
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "/echo");
    }

    #[test]
    fn malformed_chunks() {
        assert!(matches!(decode_chunked(b"zz\r\n"), Err(TransportError::InvalidChunk)));
        assert!(matches!(decode_chunked(b"5\r\nab"), Err(TransportError::Truncated)));
        assert!(matches!(decode_chunked(b"2\r\nabXX0\r\n\r\n"), Err(TransportError::InvalidChunk)));
        assert_eq!(decode_chunked(b"0\r\n\r\n").unwrap(), "");
    }
}
