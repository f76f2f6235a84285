//! Edge cache node.
//!
//! Binds the connection server core of [`edge_http`] to a TCP listener and
//! adds what a running node needs around it: configuration, routing, a
//! capability plugin registry and in-memory statistics.
//!
//! # Example
//!
//! ```no_run
//! use edge_http::handler::{RequestContext, make_handler};
//! use edge_http::protocol::{HandlerError, ResponseBody};
//! use edge_node::config::NodeConfig;
//! use edge_node::router::{Router, get};
//! use edge_node::server::Listener;
//! use http::Response;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::builder()
//!         .route(
//!             "/ping",
//!             get(make_handler(|_ctx: &RequestContext<'_>| async {
//!                 Ok::<_, HandlerError>(Response::new(ResponseBody::from("pong")))
//!             })),
//!         )
//!         .build()?;
//!
//!     let listener = Listener::bind(NodeConfig::default()).await?;
//!     listener.serve(router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod plugin;
pub mod router;
pub mod server;
pub mod stats;
pub mod status;
