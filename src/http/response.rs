//! HTTP/1.1 responses as seen by the client.
//!
//! Provides a fluent builder for synthesized responses (cache hits, test
//! fakes) and head parsing for responses read off the wire.

use bytes::Bytes;
use thiserror::Error;

use super::{Body, Headers, StatusCode};

/// Errors that can occur while parsing a response head.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response head is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid status code: {code}")]
    InvalidStatus { code: u16 },
}

/// An HTTP response.
///
/// # Examples
///
/// ```
/// use httpcache::http::{Response, StatusCode};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let mut response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert!(response.status().is_success());
/// assert_eq!(response.headers().get("content-type"), Some("application/json"));
/// assert_eq!(response.text().await.unwrap(), r#"{"status":"ok"}"#);
/// # });
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Body,
}

impl Response {
    /// Maximum number of headers we accept in a response head.
    const MAX_HEADERS: usize = 64;

    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: 1,
            headers: Headers::new(),
            body: Body::empty(),
        }
    }

    /// Parses a response head (status line and headers) from `buf`.
    ///
    /// Returns a bodiless `Response` and the byte offset at which the body
    /// begins in `buf` (immediately after the `\r\n\r\n` terminator).
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`] — more data is needed to complete the head.
    /// - [`ResponseError::Parse`] — the data is malformed.
    /// - [`ResponseError::MissingField`] / [`ResponseError::InvalidStatus`] — the
    ///   status line is unusable.
    pub fn parse_head(buf: &[u8]) -> Result<(Self, usize), ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let code = raw
            .code
            .ok_or(ResponseError::MissingField { field: "status" })?;
        let status = StatusCode::from_u16(code).ok_or(ResponseError::InvalidStatus { code })?;
        let version = raw
            .version
            .ok_or(ResponseError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.append(header.name, value);
            }
        }

        Ok((
            Self {
                status,
                version,
                headers: header_map,
                body: Body::empty(),
            },
            body_offset,
        ))
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body.
    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Returns a mutable reference to the response body.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Consumes the response, returning its body.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Reads the body to completion; see [`Body::bytes`].
    pub async fn bytes(&mut self) -> std::io::Result<Bytes> {
        self.body.bytes().await
    }

    /// Reads the body to completion as UTF-8 text, replacing invalid sequences.
    pub async fn text(&mut self) -> std::io::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
