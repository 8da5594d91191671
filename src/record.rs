//! Exchange records: the unit the cache stores and looks up.
//!
//! A [`Record`] pairs a cache key derived from the request URL with the fully
//! buffered response payload.
//!
//! ## Key derivation
//!
//! The canonical URL is built from the parsed absolute URL as
//! `scheme://host[:port]path[?query]`:
//!
//! - the port appears only when it is not the scheme default;
//! - the query (with its `?`) appears only when it is non-empty;
//! - user-info and fragment never appear.
//!
//! The key is the lowercase hex MD5 of that string followed by the extension
//! of the last path segment, e.g. `9e107d9d372bb6826bd81d3542a419d6.json`. MD5
//! is used as an identifier only.

use std::io;

use bytes::Bytes;
use url::Url;

use crate::http::Response;

/// Returns the canonical string form of `url` used for key derivation.
///
/// # Examples
///
/// ```
/// use httpcache::record::canonical_url;
/// use url::Url;
///
/// let url = Url::parse("HTTP://user:pw@Example.COM:80/a/b.json?x=1#frag").unwrap();
/// assert_eq!(canonical_url(&url), "http://example.com/a/b.json?x=1");
///
/// let url = Url::parse("http://example.com:8080/?").unwrap();
/// assert_eq!(canonical_url(&url), "http://example.com:8080/");
/// ```
pub fn canonical_url(url: &Url) -> String {
    let mut canonical = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        canonical.push(':');
        canonical.push_str(&port.to_string());
    }
    canonical.push_str(url.path());
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        canonical.push('?');
        canonical.push_str(query);
    }
    canonical
}

/// Derives the cache key for `url`.
pub fn derive_key(url: &Url) -> String {
    let digest = md5::compute(canonical_url(url).as_bytes());
    format!("{:x}{}", digest, extension(url.path()))
}

/// The extension of the last path segment, including the dot, or `""`.
fn extension(path: &str) -> &str {
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment.rfind('.').map_or("", |dot| &segment[dot..])
}

/// One request/response pairing subject to caching.
///
/// # Examples
///
/// ```
/// use httpcache::record::Record;
///
/// let record = Record::with_key("abc.json").with_payload(r#"{"a":1}"#);
/// assert_eq!(record.key(), "abc.json");
/// assert_eq!(record.len(), 7);
/// ```
#[derive(Debug, Clone)]
pub struct Record {
    key: String,
    payload: Bytes,
}

impl Record {
    /// Creates an empty record keyed by the canonical form of `url`.
    pub fn from_url(url: &Url) -> Self {
        Self::with_key(derive_key(url))
    }

    /// Creates an empty record under an explicit key.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: Bytes::new(),
        }
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Returns the cache key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the buffered payload. Cloning it is cheap.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Reads `response`'s body to completion into this record.
    ///
    /// The response keeps a buffered copy of the same bytes, so the caller can
    /// still read the body afterwards.
    pub async fn buffer_response(&mut self, response: &mut Response) -> io::Result<()> {
        self.payload = response.bytes().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Body, StatusCode};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn key_is_deterministic() {
        let a = derive_key(&url("http://example.com/data/file.json?page=2"));
        let b = derive_key(&url("http://example.com/data/file.json?page=2"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32 + ".json".len());
        assert!(a.ends_with(".json"));
        assert!(a[..32].chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn key_matches_md5_of_canonical_url() {
        let key = derive_key(&url("http://example.com/index.html"));
        let expected = format!("{:x}.html", md5::compute(b"http://example.com/index.html"));
        assert_eq!(key, expected);
    }

    #[test]
    fn equivalent_urls_share_a_key() {
        let plain = derive_key(&url("http://example.com/a"));
        assert_eq!(plain, derive_key(&url("HTTP://EXAMPLE.com:80/a")));
        assert_eq!(plain, derive_key(&url("http://example.com/a?")));
        assert_eq!(plain, derive_key(&url("http://example.com/a#section")));
        assert_ne!(plain, derive_key(&url("http://example.com/a?b=1")));
        assert_ne!(plain, derive_key(&url("https://example.com/a")));
        assert_ne!(plain, derive_key(&url("http://example.com:8080/a")));
    }

    #[test]
    fn extension_rules() {
        assert_eq!(extension("/a/b.tar.gz"), ".gz");
        assert_eq!(extension("/a.d/file"), "");
        assert_eq!(extension("/"), "");
        assert_eq!(extension("/.hidden"), ".hidden");
        assert_eq!(extension("/trailing."), ".");
    }

    #[test]
    fn query_does_not_affect_extension() {
        let key = derive_key(&url("http://example.com/feed?format=.xml"));
        assert_eq!(key.len(), 32);
    }

    #[tokio::test]
    async fn buffering_leaves_response_readable() {
        let mut response = Response::new(StatusCode::OK)
            .body(Body::from_reader(std::io::Cursor::new(b"payload".to_vec())));
        let mut record = Record::from_url(&url("http://example.com/x"));

        record.buffer_response(&mut response).await.unwrap();

        assert_eq!(record.payload().as_ref(), b"payload");
        assert_eq!(record.len(), 7);
        assert_eq!(response.text().await.unwrap(), "payload");
    }
}
