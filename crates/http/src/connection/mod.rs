//! Connection handling.
//!
//! # Components
//!
//! - [`Connection`]: owns one accepted byte stream
//!   - single bounded reads, write-and-flush, zero-copy forwarding
//!   - idempotent close releasing the stream and its socket
//! - [`RequestReader`]: captures complete requests from a connection
//!   - accumulates reads until the header block and declared body are present
//!   - keeps bytes belonging to the next request on the connection
//! - [`ResponseWriter`]: emits one response over one or more calls
//!
//! All I/O of a connection goes through `&mut Connection`, so there is never
//! more than one reader or writer on a stream.

#[allow(clippy::module_inception)]
mod connection;
mod request_reader;
mod response_writer;

pub use connection::AsyncStream;
pub use connection::BoxedStream;
pub use connection::Connection;
pub use connection::ConnectionId;
pub use request_reader::DEFAULT_IDLE_TIMEOUT;
pub use request_reader::DEFAULT_MAX_BODY_BYTES;
pub use request_reader::RequestLimits;
pub use request_reader::RequestReader;
pub use response_writer::ResponseWriter;
