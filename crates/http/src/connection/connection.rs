use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Byte stream a [`Connection`] can own: a plain socket, a TLS session over
/// it, or any in-memory pipe in tests.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Relaxed ordering is enough, ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One accepted connection and the byte stream it exclusively owns.
///
/// Every operation takes `&mut self`, so at most one read or write is in
/// flight at any time. Closing releases the stream, and with it the socket,
/// in one step; later operations fail with [`io::ErrorKind::NotConnected`].
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    stream: Option<BoxedStream>,
    read_buffer_size: usize,
}

impl Connection {
    pub fn new<S>(stream: S, peer_addr: Option<SocketAddr>, read_buffer_size: usize) -> Self
    where
        S: AsyncStream + 'static,
    {
        Self::from_boxed(Box::new(stream), peer_addr, read_buffer_size)
    }

    pub fn from_boxed(stream: BoxedStream, peer_addr: Option<SocketAddr>, read_buffer_size: usize) -> Self {
        Self { id: ConnectionId::next(), peer_addr, stream: Some(stream), read_buffer_size }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Configured capacity of a single read.
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream_mut(&mut self) -> io::Result<&mut BoxedStream> {
        self.stream.as_mut().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    /// Performs exactly one read of at most `max_bytes` bytes.
    ///
    /// Returns whatever the stream had available, which may be less than
    /// `max_bytes` and need not be a complete message. An empty result means
    /// the peer closed its side.
    pub async fn bounded_read(&mut self, max_bytes: usize) -> io::Result<Bytes> {
        let stream = self.stream_mut()?;
        let mut buf = BytesMut::zeroed(max_bytes);
        let n = stream.read(&mut buf).await?;
        buf.truncate(n);
        trace!(connection_id = %self.id, read_bytes = n, max_bytes, "bounded read");
        Ok(buf.freeze())
    }

    /// Writes all of `bytes` and flushes before returning.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    /// Copies everything `source` yields straight to the stream, then flushes.
    ///
    /// Data moves through a fixed-size intermediate buffer, so memory use does
    /// not depend on the size of the source. Returns the number of bytes forwarded.
    pub async fn forward<R>(&mut self, source: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let stream = self.stream_mut()?;
        let forwarded = tokio::io::copy(source, stream).await?;
        stream.flush().await?;
        trace!(connection_id = %self.id, forwarded, "forwarded body");
        Ok(forwarded)
    }

    /// Releases the stream and the socket beneath it. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(connection_id = %self.id, cause = %e, "shutdown stream error");
            }
            trace!(connection_id = %self.id, "connection closed");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}
