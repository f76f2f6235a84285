//! HTTP response types.
//!
//! The head of a response is a plain `http::Response<()>`. The body is a
//! [`ResponseBody`], either held in memory or read from an external source
//! and forwarded without being buffered as a whole.

use std::fmt;

use bytes::Bytes;
use http::Response;
use tokio::io::AsyncRead;

use crate::protocol::PayloadSize;

/// Type alias for HTTP response headers.
///
/// This type represents the header portion of an HTTP response, using
/// `http::Response<()>` with an empty body placeholder.
pub type ResponseHead = Response<()>;

/// Boxed byte source used for streamed bodies.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Source of a response body.
#[derive(Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Bytes(Bytes),
    /// Forwarded from `reader`; `length` is sent as `Content-Length` when known.
    Stream { reader: BodyReader, length: Option<u64> },
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Empty
    }

    pub fn stream<R>(reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        ResponseBody::Stream { reader: Box::new(reader), length }
    }

    pub fn payload_size(&self) -> PayloadSize {
        match self {
            ResponseBody::Empty => PayloadSize::Empty,
            ResponseBody::Bytes(bytes) => PayloadSize::new_length(bytes.len() as u64),
            ResponseBody::Stream { length: Some(length), .. } => PayloadSize::new_length(*length),
            ResponseBody::Stream { length: None, .. } => PayloadSize::Unbounded,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ResponseBody::Stream { length, .. } => f.debug_struct("Stream").field("length", length).finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseBody::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        ResponseBody::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        ResponseBody::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        ResponseBody::Empty
    }
}
