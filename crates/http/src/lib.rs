//! Connection server core of the edge cache node.
//!
//! This crate accepts nothing by itself. It provides the pieces a listener
//! composes for every accepted stream: optional TLS termination, request
//! capture and parsing, and a response pipeline able to stream large bodies
//! straight from their source without holding them in memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use edge_http::connection::{Connection, RequestLimits, RequestReader, ResponseWriter};
//! use edge_http::handler::{Handler, PathParams, RequestContext, make_handler};
//! use edge_http::protocol::{HandlerError, ResponseBody};
//! use edge_http::tls::TlsTerminator;
//! use http::Response;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:4000").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(|_ctx: &RequestContext<'_>| async {
//!         Ok::<_, HandlerError>(Response::new(ResponseBody::from("pong")))
//!     }));
//!     let terminator = Arc::new(TlsTerminator::disabled());
//!
//!     loop {
//!         let (tcp_stream, peer_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         let terminator = terminator.clone();
//!         tokio::spawn(async move {
//!             let Ok(stream) = terminator.wrap(tcp_stream).await else { return };
//!             let mut connection = Connection::from_boxed(stream, Some(peer_addr), 8192);
//!             let mut reader = RequestReader::new(RequestLimits::default());
//!             let params = PathParams::new();
//!
//!             while let Ok(Some(request)) = reader.next_request(&mut connection).await {
//!                 let ctx = RequestContext::new(&request, &params, connection.id(), Some(peer_addr));
//!                 let mut out = ResponseWriter::for_method(&mut connection, request.method());
//!                 if handler.call(&ctx, &mut out).await.is_err() || !out.is_reusable() {
//!                     break;
//!                 }
//!             }
//!             connection.close().await;
//!             info!(%peer_addr, "connection closed");
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`diagnostics`]: escaped rendering of raw bytes for logs
//! - [`protocol`]: request, response and error types
//! - [`codec`]: request parsing and response head encoding
//! - [`connection`]: the connection adapter, request capture and response emission
//! - [`tls`]: optional TLS termination
//! - [`handler`]: the handler trait and its request context
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - request bodies are framed by `Content-Length`, `Transfer-Encoding` is rejected
//! - maximum number of request headers: 64

pub mod codec;
pub mod connection;
pub mod diagnostics;
pub mod handler;
pub mod protocol;
pub mod tls;

mod utils;
pub(crate) use utils::ensure;
