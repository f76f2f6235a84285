//! Core protocol types of the connection server.
//!
//! # Architecture
//!
//! - **Payload framing** ([`PayloadSize`]): how a body is delimited on the wire
//! - **Requests** ([`RequestHeader`], [`Request`]): immutable view of one captured request
//! - **Responses** ([`ResponseHead`], [`ResponseBody`]): head plus in-memory or streamed body
//! - **Errors** ([`CycleError`] and its parts): one error type per stage of a handling cycle
//!
//! These types are normally produced and consumed by the [`connection`](crate::connection)
//! layer; handlers see them through [`crate::handler::Handler`].

mod payload;
pub use payload::PayloadSize;

mod request;
pub use request::Request;
pub use request::RequestHeader;

mod response;
pub use response::BodyReader;
pub use response::ResponseBody;
pub use response::ResponseHead;

mod error;
pub use error::CycleError;
pub use error::HandlerError;
pub use error::ParseError;
pub use error::ReadError;
pub use error::SendError;
