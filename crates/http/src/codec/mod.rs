//! Request parsing and response head encoding.
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`parse_request`]: turns one captured buffer into a [`Request`](crate::protocol::Request)
//!   - [`HeaderDecoder`]: streaming header decoder used while a request is still arriving
//!
//! - Response handling:
//!   - [`HeaderEncoder`]: serializes a response head before its body is emitted
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use edge_http::codec::parse_request;
//!
//! let buf = Bytes::from_static(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n");
//! let request = parse_request(buf, 8192).unwrap();
//! assert_eq!(request.method(), "GET");
//! assert_eq!(request.target(), "/ping");
//! ```

mod header;
mod request_parser;

pub use header::DEFAULT_MAX_HEADER_BYTES;
pub use header::HeaderDecoder;
pub use header::HeaderEncoder;
pub use header::MAX_HEADER_NUM;
pub use request_parser::parse_request;
