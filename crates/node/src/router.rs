//! Path and method routing.
//!
//! Routes are matched with `matchit`, so paths may capture named segments
//! (`/artifacts/{id}`) or a catch-all tail (`/files/{*path}`). Several
//! method-specific handlers can share one path. A `HEAD` request without a
//! `HEAD` handler is served by the `GET` handler, the response writer drops
//! the body.
//!
//! The [`Router`] itself is a [`Handler`]: it answers unknown paths with
//! `404 Not Found` and known paths without a handler for the request method
//! with `405 Method Not Allowed`.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use edge_http::connection::ResponseWriter;
use edge_http::handler::{Handler, PathParams, RequestContext};
use edge_http::protocol::{HandlerError, ResponseBody};
use http::{HeaderValue, Method, Response, StatusCode, header};
use tracing::debug;

type InnerRouter<T> = matchit::Router<T>;

pub struct Router {
    inner_router: InnerRouter<Vec<RouterItem>>,
}

/// A handler bound to one method, or to every method.
pub struct RouterItem {
    method: Option<Method>,
    handler: Box<dyn Handler>,
}

/// Outcome of matching a request against the router.
pub enum RouteMatch<'router> {
    Found { handler: &'router dyn Handler, params: PathParams },
    NotFound,
    MethodNotAllowed { allowed: Vec<Method> },
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn at(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let Ok(matched) = self.inner_router.at(path) else {
            return RouteMatch::NotFound;
        };

        let items = matched.value;
        let find = move |method: &Method| items.iter().find(|item| item.method.as_ref().is_none_or(|m| m == method));
        let item = match find(method) {
            None if method == Method::HEAD => find(&Method::GET),
            item => item,
        };
        match item {
            Some(item) => {
                let params = matched.params.iter().collect::<PathParams>();
                RouteMatch::Found { handler: item.handler.as_ref(), params }
            }
            None => {
                let mut allowed = items.iter().filter_map(|item| item.method.clone()).collect::<Vec<_>>();
                if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
                    allowed.push(Method::HEAD);
                }
                RouteMatch::MethodNotAllowed { allowed }
            }
        }
    }
}

#[async_trait]
impl Handler for Router {
    async fn call(&self, ctx: &RequestContext<'_>, out: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        let request = ctx.request();
        let path = request.uri().path();

        match self.at(request.method(), path) {
            RouteMatch::Found { handler, params } => {
                let ctx = RequestContext::new(request, &params, ctx.connection_id(), ctx.peer_addr());
                handler.call(&ctx, out).await
            }
            RouteMatch::NotFound => {
                debug!(connection_id = %ctx.connection_id(), path, "no route matched");
                out.send(status_response(StatusCode::NOT_FOUND)).await?;
                Ok(())
            }
            RouteMatch::MethodNotAllowed { allowed } => {
                debug!(connection_id = %ctx.connection_id(), path, method = %request.method(), "method not allowed");
                let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
                out.send(response).await?;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl fmt::Debug for RouterItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterItem").field("method", &self.method).finish_non_exhaustive()
    }
}

impl fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMatch::Found { params, .. } => f.debug_struct("Found").field("params", params).finish_non_exhaustive(),
            RouteMatch::NotFound => f.write_str("NotFound"),
            RouteMatch::MethodNotAllowed { allowed } => f.debug_struct("MethodNotAllowed").field("allowed", allowed).finish(),
        }
    }
}

/// A response whose body is the canonical reason of `status`.
pub fn status_response(status: StatusCode) -> Response<ResponseBody> {
    let reason = status.canonical_reason().unwrap_or_default();
    let mut response = Response::new(ResponseBody::from(reason));
    *response.status_mut() = status;
    response
}

#[derive(Debug, Default)]
pub struct RouterBuilder {
    data: HashMap<String, Vec<RouterItem>>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: impl Into<String>, item: RouterItem) -> Self {
        self.data.entry(route.into()).or_default().push(item);
        self
    }

    pub fn build(self) -> Result<Router, matchit::InsertError> {
        let mut inner_router = InnerRouter::new();
        for (path, items) in self.data {
            inner_router.insert(path, items)?;
        }
        Ok(Router { inner_router })
    }
}

macro_rules! method_router_item {
    ($method:ident, $method_value:expr) => {
        pub fn $method<H: Handler + 'static>(handler: H) -> RouterItem {
            RouterItem { method: Some($method_value), handler: Box::new(handler) }
        }
    };
}

method_router_item!(get, Method::GET);
method_router_item!(head, Method::HEAD);
method_router_item!(post, Method::POST);
method_router_item!(put, Method::PUT);
method_router_item!(delete, Method::DELETE);

/// Matches every method.
pub fn any<H: Handler + 'static>(handler: H) -> RouterItem {
    RouterItem { method: None, handler: Box::new(handler) }
}
