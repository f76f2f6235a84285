//! HTTP header processing module for encoding and decoding headers
//!
//! # Components
//!
//! - [`HeaderDecoder`]: Decodes request header blocks from raw bytes
//!   - Handles start line and header field validation
//!   - Enforces the configured header size limit
//!   - Reports the `Content-Length` framing of the body
//!
//! - [`HeaderEncoder`]: Encodes response heads to bytes
//!   - Writes the status line and header fields
//!   - Sets `Content-Length` or `Connection: close` from the payload size

mod header_decoder;
mod header_encoder;

pub use header_decoder::DEFAULT_MAX_HEADER_BYTES;
pub use header_decoder::HeaderDecoder;
pub use header_decoder::MAX_HEADER_NUM;
pub use header_encoder::HeaderEncoder;
