use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::{DEFAULT_MAX_HEADER_BYTES, HeaderDecoder};
use crate::connection::Connection;
use crate::diagnostics::EscapedBytes;
use crate::ensure;
use crate::protocol::{CycleError, ParseError, PayloadSize, ReadError, Request};

/// Default upper bound for a request body.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Default time a single read may wait for the peer.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds applied while a request is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_header_bytes: usize,
    pub max_body_bytes: u64,
    pub idle_timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self { max_header_bytes: DEFAULT_MAX_HEADER_BYTES, max_body_bytes: DEFAULT_MAX_BODY_BYTES, idle_timeout: DEFAULT_IDLE_TIMEOUT }
    }
}

/// Captures complete requests from a [`Connection`].
///
/// Reads are issued with [`Connection::bounded_read`] until the header block
/// is terminated, then until exactly the declared `Content-Length` body bytes
/// are buffered. Bytes read past the end of a request are kept for the next
/// call, so pipelined requests are not lost.
#[derive(Debug)]
pub struct RequestReader {
    limits: RequestLimits,
    decoder: HeaderDecoder,
    buffer: BytesMut,
    served: u64,
}

impl RequestReader {
    pub fn new(limits: RequestLimits) -> Self {
        Self { limits, decoder: HeaderDecoder::new(limits.max_header_bytes), buffer: BytesMut::new(), served: 0 }
    }

    /// Number of requests captured so far.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Bytes already read that belong to a request not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reads the next complete request.
    ///
    /// Returns `Ok(None)` when the peer closes a connection between two
    /// requests. A peer that closes before sending anything on a fresh
    /// connection, or in the middle of a request, is a [`ReadError::PeerClosed`].
    pub async fn next_request(&mut self, connection: &mut Connection) -> Result<Option<Request>, CycleError> {
        let (header, payload_size) = loop {
            if let Some(item) = self.decoder.decode(&mut self.buffer)? {
                break item;
            }

            let chunk = self.read_chunk(connection).await?;
            if chunk.is_empty() {
                if self.buffer.is_empty() && self.served > 0 {
                    trace!(connection_id = %connection.id(), "peer closed between requests");
                    return Ok(None);
                }
                return Err(ReadError::PeerClosed.into());
            }
            self.buffer.extend_from_slice(&chunk);
        };

        let body = match payload_size {
            PayloadSize::Empty => Bytes::new(),
            PayloadSize::Length(declared) => {
                let max_size = self.limits.max_body_bytes;
                ensure!(declared <= max_size, ParseError::too_large_body(declared, max_size).into());
                let length = usize::try_from(declared).map_err(|_e| ParseError::too_large_body(declared, max_size))?;

                while self.buffer.len() < length {
                    let chunk = self.read_chunk(connection).await?;
                    ensure!(!chunk.is_empty(), ReadError::PeerClosed.into());
                    self.buffer.extend_from_slice(&chunk);
                }
                self.buffer.split_to(length).freeze()
            }
            PayloadSize::Unbounded => return Err(ParseError::UnsupportedTransferEncoding.into()),
        };

        self.served += 1;
        Ok(Some(header.body(body)))
    }

    async fn read_chunk(&self, connection: &mut Connection) -> Result<Bytes, ReadError> {
        let max_bytes = connection.read_buffer_size();
        let timeout = self.limits.idle_timeout;

        let chunk = tokio::time::timeout(timeout, connection.bounded_read(max_bytes))
            .await
            .map_err(|_elapsed| ReadError::Timeout { secs: timeout.as_secs() })??;

        trace!(connection_id = %connection.id(), raw = %EscapedBytes(&chunk), "captured request bytes");
        Ok(chunk)
    }
}
