//! Header fields carried by outgoing requests and incoming responses.

use bytes::{BufMut, BytesMut};

/// One `name: value` field as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    value: String,
}

impl Field {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Header fields in wire order.
///
/// Names compare case-insensitively and repeated names are kept, since the
/// transport needs every `Transfer-Encoding` field to frame a body.
///
/// ```
/// use httpcache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Content-Length", "12");
/// headers.append("Accept", "text/html");
///
/// assert_eq!(headers.get("content-length"), Some("12"));
/// assert_eq!(headers.content_length(), Some(12));
/// assert!(headers.contains("ACCEPT"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<Field>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sized for a parsed response head.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Adds a field after the existing ones, even if `name` is already present.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values(name).next()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.is(name))
    }

    /// Number of fields, counting repeats.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared body length, if the field is present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length")?.trim().parse().ok()
    }

    /// Whether `chunked` is the final transfer coding across all
    /// `Transfer-Encoding` fields.
    pub fn is_chunked(&self) -> bool {
        self.values("transfer-encoding")
            .flat_map(|value| value.split(','))
            .last()
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Writes every field as `name: value\r\n`.
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        for field in &self.fields {
            buf.put(field.name.as_bytes());
            buf.put(&b": "[..]);
            buf.put(field.value.as_bytes());
            buf.put(&b"\r\n"[..]);
        }
    }

    fn values<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.fields
            .iter()
            .filter(move |field| field.is(name))
            .map(|field| field.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_and_keeps_first() {
        let mut h = Headers::new();
        h.append("Content-Type", "text/plain");
        h.append("content-type", "text/html");
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(h.len(), 2);
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn content_length_parsing() {
        let mut h = Headers::new();
        h.append("Content-Length", " 42 ");
        assert_eq!(h.content_length(), Some(42));

        let mut h = Headers::new();
        h.append("Content-Length", "lots");
        assert_eq!(h.content_length(), None);
        assert_eq!(Headers::new().content_length(), None);
    }

    #[test]
    fn chunked_must_be_final_coding() {
        let mut h = Headers::new();
        h.append("Transfer-Encoding", "gzip, chunked");
        assert!(h.is_chunked());

        let mut h = Headers::new();
        h.append("Transfer-Encoding", "chunked, gzip");
        assert!(!h.is_chunked());

        // Codings listed across repeated fields are read in order.
        let mut h = Headers::new();
        h.append("Transfer-Encoding", "gzip");
        h.append("transfer-encoding", "Chunked");
        assert!(h.is_chunked());
    }

    #[test]
    fn encodes_in_wire_order() {
        let mut h = Headers::new();
        h.append("Accept", "*/*");
        h.append("X-Trace", "1");
        let mut buf = BytesMut::new();
        h.encode(&mut buf);
        assert_eq!(&buf[..], b"Accept: */*\r\nX-Trace: 1\r\n");
    }
}
