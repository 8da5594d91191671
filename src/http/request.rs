//! Outgoing HTTP/1.1 requests.
//!
//! A [`Request`] always carries an absolute [`Url`]; the cache derives its key
//! from it and transports use it to find the origin.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use url::Url;

use super::{Headers, Method};

/// Content type used by [`Request::post_form`].
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors that can occur while building a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("URL has no host: {url}")]
    MissingHost { url: String },
}

/// An outgoing HTTP request.
///
/// # Examples
///
/// ```
/// use httpcache::http::{Method, Request};
///
/// let request = Request::get("http://example.com/search?q=rust").unwrap();
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.path(), "/search");
/// assert_eq!(request.query_param("q").as_deref(), Some("rust"));
/// assert_eq!(request.request_target(), "/search?q=rust");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Parses `url` and checks that it is an absolute `http`/`https` URL with a host.
    ///
    /// # Errors
    ///
    /// - [`RequestError::InvalidUrl`] — `url` does not parse.
    /// - [`RequestError::UnsupportedScheme`] — the scheme is not `http` or `https`.
    /// - [`RequestError::MissingHost`] — the URL has no host component.
    pub fn parse_url(url: &str) -> Result<Url, RequestError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(RequestError::MissingHost {
                url: url.to_string(),
            });
        }
        Ok(url)
    }

    /// Builds a `GET` request.
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Ok(Self::new(Method::Get, Self::parse_url(url)?))
    }

    /// Builds a `POST` request with the given `Content-Type` and body.
    pub fn post(
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Self, RequestError> {
        Ok(Self::new(Method::Post, Self::parse_url(url)?)
            .header("Content-Type", content_type)
            .body(body))
    }

    /// Builds a `POST` request whose body is the form encoding of `pairs`.
    ///
    /// ```
    /// use httpcache::http::Request;
    ///
    /// let request = Request::post_form("http://example.com/login", [("user", "a b"), ("x", "1&2")]).unwrap();
    /// assert_eq!(request.body_bytes().as_ref(), b"user=a+b&x=1%262");
    /// assert_eq!(request.headers().get("content-type"), Some("application/x-www-form-urlencoded"));
    /// ```
    pub fn post_form<I, K, V>(url: &str, pairs: I) -> Result<Self, RequestError>
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<(K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Self::post(url, FORM_CONTENT_TYPE, encoded)
    }

    /// Appends a request header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the absolute request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the percent-encoded URL path.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.url.query()
    }

    /// Returns the first decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns a mutable reference to the request headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the request body bytes.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// The origin-form request target: path plus `?query` when present.
    pub fn request_target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_owned(),
        }
    }

    /// The `Host` header value: host plus the port when it is not the default.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    /// Serializes the request using HTTP/1.1 wire format.
    ///
    /// Automatically adds, unless already set:
    /// - `Host: <authority>`
    /// - `Connection: close`
    /// - `Content-Length: <n>` when the body is non-empty or the method
    ///   normally carries one (`POST`, `PUT`, `PATCH`).
    pub fn to_wire(&self) -> BytesMut {
        let estimated_size = 128 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Request line
        buf.put(format!("{} {} HTTP/1.1\r\n", self.method, self.request_target()).as_bytes());

        if !self.headers.contains("host") {
            buf.put(format!("Host: {}\r\n", self.authority()).as_bytes());
        }
        self.headers.encode(&mut buf);
        if !self.headers.contains("connection") {
            buf.put(&b"Connection: close\r\n"[..]);
        }
        let wants_length = !self.body.is_empty()
            || matches!(self.method, Method::Post | Method::Put | Method::Patch);
        if wants_length && !self.headers.contains("content-length") {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }

        // Header/body separator
        buf.put(&b"\r\n"[..]);
        buf.put(self.body.as_ref());

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(request: &Request) -> String {
        String::from_utf8(request.to_wire().to_vec()).unwrap()
    }

    #[test]
    fn simple_get_wire_format() {
        let req = Request::get("http://example.com/index.html").unwrap();
        assert_eq!(
            wire(&req),
            "GET /index.html HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn non_default_port_in_host() {
        let req = Request::get("http://127.0.0.1:8080/a?b=c").unwrap();
        let s = wire(&req);
        assert!(s.starts_with("GET /a?b=c HTTP/1.1\r\n"));
        assert!(s.contains("Host: 127.0.0.1:8080\r\n"));
    }

    #[test]
    fn post_carries_length_and_body() {
        let req = Request::post("http://example.com/api", "application/json", r#"{"a":1}"#).unwrap();
        let s = wire(&req);
        assert!(s.contains("Content-Type: application/json\r\n"));
        assert!(s.contains("Content-Length: 7\r\n"));
        assert!(s.ends_with("\r\n\r\n{\"a\":1}"));
    }

    #[test]
    fn explicit_headers_are_not_duplicated() {
        let req = Request::get("http://example.com/")
            .unwrap()
            .header("Host", "other.example")
            .header("Connection", "keep-alive");
        let s = wire(&req);
        assert_eq!(s.matches("Host:").count(), 1);
        assert!(s.contains("Host: other.example\r\n"));
        assert!(!s.contains("Connection: close"));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            Request::get("ftp://example.com/file"),
            Err(RequestError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            Request::get("not a url"),
            Err(RequestError::InvalidUrl(_))
        ));
    }

    #[test]
    fn query_accessors() {
        let req = Request::get("http://example.com/search?q=a+b&page=2").unwrap();
        assert_eq!(req.query_string(), Some("q=a+b&page=2"));
        assert_eq!(req.query_param("q").as_deref(), Some("a b"));
        assert_eq!(req.query_param("page").as_deref(), Some("2"));
        assert_eq!(req.query_param("missing"), None);
    }
}
