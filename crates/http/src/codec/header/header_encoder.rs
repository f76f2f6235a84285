//! HTTP header encoder implementation for serializing HTTP response headers
//!
//! This module encodes a response head into raw bytes: the status line, the
//! header fields and the blank line terminating the header block. The framing
//! header is derived from the [`PayloadSize`] the caller is about to send.

use crate::protocol::{PayloadSize, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CLOSE_VALUE: HeaderValue = HeaderValue::from_static("close");

/// Encoder for HTTP response headers implementing the [`Encoder`] trait.
///
/// - `Length(n)` and `Empty` set `Content-Length`
/// - `Unbounded` drops `Content-Length` and sets `Connection: close`, the peer
///   reads the body until the connection is closed
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// Encodes HTTP response headers into the provided bytes buffer.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - HTTP version is not supported (only HTTP/1.0 and HTTP/1.1)
    /// - Writing to buffer fails
    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        write!(
            FastWrite(dst),
            "{} {} {}\r\n",
            version,
            head.status().as_str(),
            head.status().canonical_reason().unwrap_or("")
        )?;

        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Empty => {
                const ZERO_VALUE: HeaderValue = HeaderValue::from_static("0");
                headers.insert(header::CONTENT_LENGTH, ZERO_VALUE);
            }
            PayloadSize::Unbounded => {
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::CONNECTION, CLOSE_VALUE);
            }
        }

        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Fast writer implementation for writing to BytesMut.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
