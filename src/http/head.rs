//! Message heads and their wire serialization.
//!
//! The vocabulary (status codes, methods, versions, header maps) comes from
//! the `http` crate. Only the HTTP/1.x text form is written here.

use std::fmt::Write as _;

use bytes::BytesMut;
use http::header::{IntoHeaderName, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, Version};

/// Common surface of request and response heads.
pub trait MessageHead {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Protocol version the message is written with.
    fn version(&self) -> Version;

    /// Append the start line, without its CRLF.
    fn write_start_line(&self, buf: &mut BytesMut);

    /// Whether a message with this head may carry a body at all.
    fn permits_body(&self) -> bool {
        true
    }
}

/// Response head: status line plus headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    /// Overrides the canonical reason phrase.
    pub reason: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// HTTP/1.1 response with the given status and no headers.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::HTTP_11,
            status,
            reason: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set a custom reason phrase.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Append a header, keeping earlier values of the same name.
    ///
    /// Static string names are parsed like [`HeaderMap::append`] does and
    /// panic if invalid.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Reason phrase that will be written.
    pub fn reason_phrase(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }
}

impl MessageHead for ResponseHead {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn version(&self) -> Version {
        self.version
    }

    fn write_start_line(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(version_str(self.version).as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.status.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.reason_phrase().as_bytes());
    }

    /// 1xx, 204 and 304 responses never have a body.
    fn permits_body(&self) -> bool {
        !(self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED)
    }
}

/// Request head: request line plus headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// HTTP/1.1 request with no headers.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Append a header, keeping earlier values of the same name.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

impl MessageHead for RequestHead {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn version(&self) -> Version {
        self.version
    }

    fn write_start_line(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        // Writing into BytesMut cannot fail.
        let _ = write!(buf, "{}", self.uri);
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(version_str(self.version).as_bytes());
    }
}

/// Text form of a protocol version. Unknown versions are written as 1.1.
pub(crate) fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_09 {
        "HTTP/0.9"
    } else if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else if version == Version::HTTP_2 {
        "HTTP/2.0"
    } else if version == Version::HTTP_3 {
        "HTTP/3.0"
    } else {
        "HTTP/1.1"
    }
}

/// Whether a declared `content-length` is present.
pub(crate) fn has_content_length(headers: &HeaderMap) -> bool {
    headers.contains_key(CONTENT_LENGTH)
}

/// Whether `chunked` is the final transfer coding.
pub(crate) fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Append every header as `name: value\r\n`, in map order.
pub(crate) fn write_headers(headers: &HeaderMap, buf: &mut BytesMut) {
    for (name, value) in headers {
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
}

/// Serialized size of [`write_headers`].
pub(crate) fn encoded_len(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;

    fn start_line(head: &impl MessageHead) -> String {
        let mut buf = BytesMut::new();
        head.write_start_line(&mut buf);
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn test_version_str() {
        assert_eq!(version_str(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(version_str(Version::HTTP_10), "HTTP/1.0");
    }

    #[test]
    fn test_content_length_detection() {
        let mut headers = HeaderMap::new();
        assert!(!has_content_length(&headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from(42u64));
        assert!(has_content_length(&headers));
    }

    #[test]
    fn test_is_chunked() {
        let mut headers = HeaderMap::new();
        assert!(!is_chunked(&headers));

        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("gzip, Chunked"));
        assert!(is_chunked(&headers));

        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked, gzip"));
        assert!(!is_chunked(&headers));

        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("gzip"));
        headers.append(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert!(is_chunked(&headers));
    }

    #[test]
    fn test_write_headers() {
        let mut headers = HeaderMap::new();
        headers.append("a", HeaderValue::from_static("1"));
        headers.append("bb", HeaderValue::from_static("22"));
        headers.append("a", HeaderValue::from_static("3"));

        let mut buf = BytesMut::new();
        write_headers(&headers, &mut buf);

        assert_eq!(&buf[..], b"a: 1\r\na: 3\r\nbb: 22\r\n");
        assert_eq!(encoded_len(&headers), buf.len());
    }

    #[test]
    fn test_response_start_line() {
        assert_eq!(start_line(&ResponseHead::new(StatusCode::OK)), "HTTP/1.1 200 OK");
        assert_eq!(
            start_line(&ResponseHead::new(StatusCode::NOT_FOUND).with_version(Version::HTTP_10)),
            "HTTP/1.0 404 Not Found"
        );

        let custom = StatusCode::from_u16(299).unwrap();
        assert_eq!(
            start_line(&ResponseHead::new(custom).with_reason("Custom")),
            "HTTP/1.1 299 Custom"
        );
        assert_eq!(start_line(&ResponseHead::new(custom)), "HTTP/1.1 299 ");
    }

    #[test]
    fn test_request_start_line() {
        let head = RequestHead::new(Method::POST, Uri::from_static("/upload?id=7"))
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(start_line(&head), "POST /upload?id=7 HTTP/1.1");
        assert_eq!(head.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_permits_body() {
        assert!(ResponseHead::new(StatusCode::OK).permits_body());
        assert!(!ResponseHead::new(StatusCode::SWITCHING_PROTOCOLS).permits_body());
        assert!(!ResponseHead::new(StatusCode::NO_CONTENT).permits_body());
        assert!(!ResponseHead::new(StatusCode::NOT_MODIFIED).permits_body());
        assert!(RequestHead::new(Method::GET, Uri::from_static("/")).permits_body());
    }
}
