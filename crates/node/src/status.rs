//! Built-in status routes of the node.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use edge_http::connection::ResponseWriter;
use edge_http::handler::{Handler, RequestContext};
use edge_http::protocol::{HandlerError, ResponseBody};
use http::{HeaderValue, Response, header};

use crate::router::{RouterBuilder, get};
use crate::stats::NodeStats;

/// Liveness probe, answers `pong`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn call(&self, _ctx: &RequestContext<'_>, out: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        out.send(Response::new(ResponseBody::from("pong"))).await?;
        Ok(())
    }
}

/// Current [`NodeStats`] as JSON.
#[derive(Debug, Clone)]
pub struct StatsHandler {
    stats: Arc<NodeStats>,
}

impl StatsHandler {
    pub fn new(stats: Arc<NodeStats>) -> Self {
        Self { stats }
    }
}

#[async_trait]
impl Handler for StatsHandler {
    async fn call(&self, _ctx: &RequestContext<'_>, out: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        let body = serde_json::to_vec(&self.stats.snapshot())?;
        let mut response = Response::new(ResponseBody::from(Bytes::from(body)));
        response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        out.send(response).await?;
        Ok(())
    }
}

/// Adds `/ping` and `/stats` to `builder`.
pub fn routes(builder: RouterBuilder, stats: Arc<NodeStats>) -> RouterBuilder {
    builder
        .route("/ping", get(PingHandler))
        .route("/stats", get(StatsHandler::new(stats)))
}
