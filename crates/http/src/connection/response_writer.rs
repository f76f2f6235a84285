use bytes::BytesMut;
use http::{HeaderMap, Method, Response, StatusCode, header};
use tokio::io::AsyncRead;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::HeaderEncoder;
use crate::connection::Connection;
use crate::ensure;
use crate::protocol::{PayloadSize, ResponseBody, ResponseHead, SendError};

/// Emits one response on a borrowed [`Connection`], possibly over several calls.
///
/// Each call is written and flushed before it returns, nothing is buffered or
/// merged across calls. The head goes out exactly once and must precede any
/// body bytes.
///
/// A writer answering a `HEAD` request sends the head with its real framing
/// headers and discards every body byte handed to it.
#[derive(Debug)]
pub struct ResponseWriter<'conn> {
    connection: &'conn mut Connection,
    encoder: HeaderEncoder,
    buffer: BytesMut,
    status: Option<StatusCode>,
    payload_size: Option<PayloadSize>,
    closes_connection: bool,
    head_only: bool,
    body_written: u64,
    bytes_written: u64,
}

impl<'conn> ResponseWriter<'conn> {
    pub fn new(connection: &'conn mut Connection) -> Self {
        Self {
            connection,
            encoder: HeaderEncoder,
            buffer: BytesMut::new(),
            status: None,
            payload_size: None,
            closes_connection: false,
            head_only: false,
            body_written: 0,
            bytes_written: 0,
        }
    }

    /// A writer for a response to `method`, body bytes are dropped for `HEAD`.
    pub fn for_method(connection: &'conn mut Connection, method: &Method) -> Self {
        Self { head_only: method == Method::HEAD, ..Self::new(connection) }
    }

    /// Whether body bytes are discarded instead of sent.
    pub fn is_head_only(&self) -> bool {
        self.head_only
    }

    /// Encodes and sends the status line and headers.
    ///
    /// The framing header is derived from `payload_size`, overriding any
    /// `Content-Length` already present in `head`.
    pub async fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), SendError> {
        ensure!(self.status.is_none(), SendError::HeadAlreadySent);

        let status = head.status();
        // without a body the peer always knows where a HEAD response ends
        let closes_connection = (payload_size.is_unbounded() && !self.head_only) || has_close_token(head.headers());

        self.buffer.clear();
        self.encoder.encode((head, payload_size), &mut self.buffer)?;
        self.connection.write(&self.buffer).await?;

        self.bytes_written += self.buffer.len() as u64;
        self.status = Some(status);
        self.payload_size = Some(payload_size);
        self.closes_connection = closes_connection;
        trace!(connection_id = %self.connection.id(), status = status.as_u16(), ?payload_size, "sent response head");
        Ok(())
    }

    /// Sends `bytes` as the next part of the body.
    pub async fn write_body(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        let payload_size = self.payload_size.ok_or(SendError::HeadNotSent)?;
        let len = bytes.len() as u64;
        if let Some(declared) = payload_size.expected_len() {
            ensure!(
                self.body_written + len <= declared,
                SendError::invalid_body(format!("body exceeds declared length {declared}"))
            );
        }

        if self.head_only {
            self.body_written += len;
            return Ok(());
        }
        self.connection.write(bytes).await?;
        self.body_written += len;
        self.bytes_written += len;
        Ok(())
    }

    /// Streams everything `reader` yields as the next part of the body.
    ///
    /// Returns the number of bytes forwarded. A head-only writer leaves
    /// `reader` untouched and forwards nothing.
    pub async fn forward_body<R>(&mut self, reader: &mut R) -> Result<u64, SendError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        ensure!(self.payload_size.is_some(), SendError::HeadNotSent);
        if self.head_only {
            return Ok(0);
        }

        let forwarded = self.connection.forward(reader).await?;
        self.body_written += forwarded;
        self.bytes_written += forwarded;
        Ok(forwarded)
    }

    /// Sends a whole response: its head, then its body according to the body source.
    pub async fn send(&mut self, response: Response<ResponseBody>) -> Result<(), SendError> {
        let (parts, body) = response.into_parts();
        let payload_size = body.payload_size();
        self.write_head(ResponseHead::from_parts(parts, ()), payload_size).await?;
        if self.head_only {
            return Ok(());
        }

        match body {
            ResponseBody::Empty => Ok(()),
            ResponseBody::Bytes(bytes) => self.write_body(&bytes).await,
            ResponseBody::Stream { mut reader, length } => {
                let forwarded = self.forward_body(&mut reader).await?;
                match length {
                    Some(declared) if declared != forwarded => Err(SendError::invalid_body(format!(
                        "stream yielded {forwarded} bytes, declared {declared}"
                    ))),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Total bytes put on the wire, head included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn head_sent(&self) -> bool {
        self.status.is_some()
    }

    /// Status of the sent head, `None` before [`write_head`](Self::write_head).
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn payload_size(&self) -> Option<PayloadSize> {
        self.payload_size
    }

    /// Whether the peer can tell where this response ends, so that another
    /// request may follow on the same connection.
    pub fn is_reusable(&self) -> bool {
        if self.closes_connection {
            return false;
        }
        if self.head_only {
            return self.payload_size.is_some();
        }
        match self.payload_size {
            Some(PayloadSize::Empty) => self.body_written == 0,
            Some(PayloadSize::Length(declared)) => self.body_written == declared,
            Some(PayloadSize::Unbounded) | None => false,
        }
    }
}

fn has_close_token(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}
