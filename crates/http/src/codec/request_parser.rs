//! Single-buffer request parsing.
//!
//! [`parse_request`] never waits for more input: the buffer it is given is
//! everything it will see, so an incomplete header block or body is reported
//! as an error instead of being returned as if the request were complete.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::HeaderDecoder;
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, Request};

/// Parses one request out of `buf`, the result of a read of at most `read_capacity` bytes.
///
/// A header block that is still open when the buffer is full means the
/// request did not fit the read and was cut off, which is reported as
/// [`ParseError::TooLargeHeader`]. Bytes beyond the declared `Content-Length`
/// are not part of the request.
///
/// # Errors
///
/// - [`ParseError::Empty`] for an empty buffer (the peer disconnected)
/// - [`ParseError::Incomplete`] when the header block is unterminated in a short buffer
/// - [`ParseError::TooLargeHeader`] when the header block was truncated by the read size
/// - [`ParseError::IncompleteBody`] when fewer body bytes than declared are present
/// - any header validation error of [`HeaderDecoder`]
pub fn parse_request(buf: Bytes, read_capacity: usize) -> Result<Request, ParseError> {
    ensure!(!buf.is_empty(), ParseError::Empty);

    let received = buf.len();
    let mut src = BytesMut::from(buf);

    let Some((header, payload_size)) = HeaderDecoder::new(read_capacity).decode(&mut src)? else {
        return Err(if received >= read_capacity {
            ParseError::too_large_header(received, read_capacity)
        } else {
            ParseError::Incomplete { received }
        });
    };

    let body = match payload_size {
        PayloadSize::Empty => Bytes::new(),
        PayloadSize::Length(declared) => {
            let length = usize::try_from(declared).map_err(|_e| ParseError::incomplete_body(declared, src.len()))?;
            ensure!(src.len() >= length, ParseError::incomplete_body(declared, src.len()));
            src.split_to(length).freeze()
        }
        PayloadSize::Unbounded => return Err(ParseError::UnsupportedTransferEncoding),
    };

    Ok(header.body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Method, Version};
    use indoc::indoc;

    const READ_SIZE: usize = 8192;

    #[test]
    fn ping() {
        let buf = Bytes::from_static(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n");

        let request = parse_request(buf, READ_SIZE).unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.target(), "/ping");
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.headers().get(http::header::HOST), Some(&HeaderValue::from_static("x")));
        assert!(request.body().is_empty());
    }

    #[test]
    fn body_sliced_to_content_length() {
        let str = indoc! {r##"
        POST /api/report HTTP/1.1
        Host: node.example
        Content-Length: 7

        {"a":1}GET /next HTTP/1.1"##};

        let request = parse_request(Bytes::from_static(str.as_bytes()), READ_SIZE).unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.target(), "/api/report");
        assert_eq!(&request.body()[..], br#"{"a":1}"#);
    }

    #[test]
    fn empty_buffer() {
        assert!(matches!(parse_request(Bytes::new(), READ_SIZE), Err(ParseError::Empty)));
    }

    #[test]
    fn malformed_start_line() {
        let result = parse_request(Bytes::from_static(b"HELLO THERE\r\n\r\n\r\n"), READ_SIZE);
        assert!(result.is_err());

        let result = parse_request(Bytes::from_static(b"GET /index.html HTTP/2.0\r\n\r\n"), READ_SIZE);
        assert!(result.is_err());
    }

    #[test]
    fn partial_headers() {
        let result = parse_request(Bytes::from_static(b"GET /measure/1 HTTP/1.1\r\nHost: no"), READ_SIZE);
        assert!(matches!(result, Err(ParseError::Incomplete { received: 33 })));

        let result = parse_request(Bytes::from_static(b"GET /"), READ_SIZE);
        assert!(matches!(result, Err(ParseError::Incomplete { received: 5 })));
    }

    #[test]
    fn header_block_truncated_by_read_size() {
        // 9000 byte header block captured by one read of 8192 bytes
        let mut raw = b"GET /download/abc HTTP/1.1\r\nX-Fill: ".to_vec();
        raw.resize(9000 - 4, b'a');
        raw.extend_from_slice(b"\r\n\r\n");
        assert_eq!(raw.len(), 9000);

        let captured = Bytes::from(raw).slice(..READ_SIZE);
        let result = parse_request(captured, READ_SIZE);

        assert!(matches!(result, Err(ParseError::TooLargeHeader { current_size: 8192, max_size: 8192 })));
    }

    #[test]
    fn body_shorter_than_declared() {
        let buf = Bytes::from_static(b"PUT /upload HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        let result = parse_request(buf, READ_SIZE);
        assert!(matches!(result, Err(ParseError::IncompleteBody { declared: 10, received: 3 })));
    }
}
