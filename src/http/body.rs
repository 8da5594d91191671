//! Response bodies: either fully buffered or a single-use byte stream.

use std::fmt;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A response body.
///
/// Transports usually hand back a [`Body::Stream`] wired to the connection.
/// Once [`Body::bytes`] has been awaited the body is [`Body::Full`] and can be
/// read any number of times.
///
/// # Examples
///
/// ```
/// use httpcache::http::Body;
///
/// # tokio_test_block(async {
/// let mut body = Body::from_reader(&b"streamed"[..]);
/// assert!(!body.is_buffered());
/// assert_eq!(body.bytes().await.unwrap(), "streamed");
/// assert!(body.is_buffered());
/// assert_eq!(body.bytes().await.unwrap(), "streamed");
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub enum Body {
    /// Bytes already in memory.
    Full(Bytes),
    /// A stream that has not been read yet.
    Stream(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl Body {
    /// An empty, buffered body.
    pub fn empty() -> Self {
        Self::Full(Bytes::new())
    }

    /// Wraps a reader as a streaming body.
    pub fn from_reader(reader: impl AsyncRead + Send + Sync + Unpin + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }

    /// Returns `true` once the body is held in memory.
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Returns the buffered bytes without reading, or `None` for a pending stream.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Full(bytes) => Some(bytes),
            Self::Stream(_) => None,
        }
    }

    /// Reads the body to completion and returns its bytes.
    ///
    /// A streaming body is replaced by the buffered copy, so later calls (and
    /// other readers of this body) see the same bytes again. If reading fails
    /// the body is left empty.
    pub async fn bytes(&mut self) -> io::Result<Bytes> {
        let bytes = match std::mem::take(self) {
            Self::Full(bytes) => bytes,
            Self::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Bytes::from(buf)
            }
        };
        *self = Self::Full(bytes.clone());
        Ok(bytes)
    }

    /// Consumes the body, reading it to completion.
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        self.bytes().await
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Full(bytes.into())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Full(text.into())
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Full(Bytes::from_static(text.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Full(Bytes::from_static(bytes))
    }
}
