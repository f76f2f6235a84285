//! HTTP request handling implementation.
//!
//! This module provides the core abstractions for captured requests.
//! [`RequestHeader`] wraps the standard `http::Request<()>` type and
//! [`Request`] couples it with the body bytes taken from the same buffer.

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Request as HttpRequest, Uri, Version, header};

/// Represents an HTTP request header.
///
/// This struct wraps a `http::Request<()>` to provide:
/// - Access to standard HTTP header fields
/// - Connection persistence inspection
/// - Body attachment capabilities
#[derive(Debug)]
pub struct RequestHeader {
    inner: HttpRequest<()>,
}

impl AsRef<HttpRequest<()>> for RequestHeader {
    fn as_ref(&self) -> &HttpRequest<()> {
        &self.inner
    }
}

impl RequestHeader {
    /// Attaches a body to this header, converting it into a [`Request`].
    pub fn body(self, body: Bytes) -> Request {
        Request { header: self, body }
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    ///
    /// Iteration yields header names in the order they first appeared on the wire.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the client asked to reuse the connection after this request.
    ///
    /// HTTP/1.1 defaults to persistent connections unless `Connection: close`
    /// is present, HTTP/1.0 only persists with `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let connection = self.headers().get_all(header::CONNECTION);
        let has_token = |token: &str| {
            connection
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|value| value.trim().eq_ignore_ascii_case(token))
        };

        match self.version() {
            Version::HTTP_11 => !has_token("close"),
            _ => has_token("keep-alive"),
        }
    }
}

/// Converts request parts into a RequestHeader.
impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: HttpRequest::from_parts(parts, ()) }
    }
}

/// Converts a bodyless request into a RequestHeader.
impl From<HttpRequest<()>> for RequestHeader {
    #[inline]
    fn from(inner: HttpRequest<()>) -> Self {
        Self { inner }
    }
}

/// A fully captured request: header plus the body bytes declared by `Content-Length`.
///
/// Both parts are slices of the single buffer the request was parsed from.
#[derive(Debug)]
pub struct Request {
    header: RequestHeader,
    body: Bytes,
}

impl Request {
    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    /// The request target as sent on the request line (path and query).
    pub fn target(&self) -> &str {
        self.uri().path_and_query().map_or_else(|| self.uri().path(), |pq| pq.as_str())
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_keep_alive(&self) -> bool {
        self.header.is_keep_alive()
    }
}
