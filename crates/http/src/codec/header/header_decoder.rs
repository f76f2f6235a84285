//! HTTP header decoder implementation for parsing HTTP request headers
//!
//! This module decodes a request header block from raw bytes into a
//! [`RequestHeader`] and the [`PayloadSize`] announced by its headers.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: configurable, 8KB by default
//! - Only HTTP/1.0 and HTTP/1.1
//! - Bodies are framed by `Content-Length` only; any `Transfer-Encoding` is rejected
//!
//! # Implementation Details
//!
//! The decoder works in multiple stages:
//!
//! 1. Parse raw bytes using `httparse`
//! 2. Record path and header name/value byte ranges
//! 3. Split the header block off the buffer and slice it into typed values
//! 4. Determine the payload size from `Content-Length`

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Default maximum size in bytes allowed for the entire header section
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP request headers implementing the [`Decoder`] trait.
///
/// On success the header block is split off `src`; whatever follows it
/// (body bytes, a pipelined request) stays in the buffer.
#[derive(Debug, Clone, Copy)]
pub struct HeaderDecoder {
    max_header_bytes: usize,
}

impl HeaderDecoder {
    pub fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_BYTES)
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode HTTP headers from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((header, payload_size)))` if a complete header was successfully parsed
    /// - `Ok(None)` if more data is needed and the limit is not reached yet
    /// - `Err(ParseError)` if parsing failed
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if:
    /// - The number of headers exceeds `MAX_HEADER_NUM`
    /// - The header block exceeds the configured size
    /// - The request line or a header field is malformed
    /// - The body framing headers are invalid or unsupported
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Shortest valid request line plus terminator is "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            Error::Version => ParseError::InvalidVersion(None),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(header_size = body_offset, "parsed request header");
                ensure!(body_offset <= self.max_header_bytes, ParseError::too_large_header(body_offset, self.max_header_bytes));

                let version = match req.version {
                    Some(0) => http::Version::HTTP_10,
                    Some(1) => http::Version::HTTP_11,
                    // Currently HTTP/2 and HTTP/3 not supported
                    v => return Err(ParseError::InvalidVersion(v)),
                };

                let method = req.method.ok_or(ParseError::InvalidMethod)?;
                let method = Method::from_bytes(method.as_bytes()).map_err(|_e| ParseError::InvalidMethod)?;

                let path = req.path.ok_or(ParseError::InvalidUri)?;
                let path_range = ByteRange::of(src, path.as_bytes());

                let header_count = req.headers.len();
                let mut header_index = [HeaderIndex::EMPTY; MAX_HEADER_NUM];
                HeaderIndex::record(src, req.headers, &mut header_index);

                // Split header portion from source buffer, every value below is a slice of it
                let header_bytes = src.split_to(body_offset).freeze();

                let uri = Uri::from_maybe_shared(header_bytes.slice(path_range.0..path_range.1))
                    .map_err(|_e| ParseError::InvalidUri)?;

                let mut header_map = HeaderMap::with_capacity(header_count);
                for index in &header_index[..header_count] {
                    let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1])
                        .map_err(|e| ParseError::invalid_header(e.to_string()))?;
                    let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1))
                        .map_err(|e| ParseError::invalid_header(e.to_string()))?;
                    header_map.append(name, value);
                }

                let mut request = Request::builder()
                    .method(method)
                    .uri(uri)
                    .version(version)
                    .body(())
                    .map_err(|e| ParseError::invalid_header(e.to_string()))?;
                *request.headers_mut() = header_map;

                let header = RequestHeader::from(request);
                let payload_size = parse_payload(&header)?;

                Ok(Some((header, payload_size)))
            }
            // If parsing incomplete, ensure current buffer size does not exceed limit
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                Ok(None)
            }
        }
    }
}

/// Start and end position of a slice within the buffer it was parsed from.
#[derive(Clone, Copy)]
struct ByteRange(usize, usize);

impl ByteRange {
    fn of(bytes: &[u8], part: &[u8]) -> Self {
        let start = part.as_ptr() as usize - bytes.as_ptr() as usize;
        ByteRange(start, start + part.len())
    }
}

/// Stores the byte range positions of a header's name and value within the original buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    const EMPTY: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

    /// Records the byte positions of header names and values from the parsed headers.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name = ByteRange::of(bytes, header.name.as_bytes());
            let value = ByteRange::of(bytes, header.value);
            index.name = (name.0, name.1);
            index.value = (value.0, value.1);
        }
    }
}

/// Determines the body framing announced by the request headers.
///
/// `Content-Length` is honoured for every method so that a body sent with a
/// GET can never be mistaken for the next request on the connection.
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let mut cl_headers = header.headers().get_all(http::header::CONTENT_LENGTH).iter();

    match (te_header, cl_headers.next()) {
        (None, None) => Ok(PayloadSize::Empty),

        (Some(_), None) => Err(ParseError::UnsupportedTransferEncoding),

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            ensure!(
                cl_headers.all(|other| other.as_bytes().trim_ascii() == cl_str.trim().as_bytes()),
                ParseError::invalid_content_length("conflicting content-length values")
            );

            Ok(PayloadSize::new_length(length))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}
