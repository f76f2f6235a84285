//! Request handlers.
//!
//! A [`Handler`] receives the captured request through a [`RequestContext`]
//! and emits its response through a [`ResponseWriter`], in as many calls as it
//! likes. Plain async functions producing a whole `Response` can be turned
//! into handlers with [`make_handler`].

use std::future::Future;
use std::net::SocketAddr;

use async_trait::async_trait;
use http::Response;

use crate::connection::{ConnectionId, ResponseWriter};
use crate::protocol::{HandlerError, Request, ResponseBody};

#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &RequestContext<'_>, out: &mut ResponseWriter<'_>) -> Result<(), HandlerError>;
}

/// Named segments captured from the request path by the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for PathParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { params: iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect() }
    }
}

/// Everything a handler may know about the request it is serving.
#[derive(Debug)]
pub struct RequestContext<'a> {
    request: &'a Request,
    path_params: &'a PathParams,
    connection_id: ConnectionId,
    peer_addr: Option<SocketAddr>,
}

impl<'a> RequestContext<'a> {
    pub fn new(
        request: &'a Request,
        path_params: &'a PathParams,
        connection_id: ConnectionId,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        Self { request, path_params, connection_id, peer_addr }
    }

    pub fn request(&self) -> &'a Request {
        self.request
    }

    pub fn path_params(&self) -> &'a PathParams {
        self.path_params
    }

    /// Shorthand for `path_params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.path_params.get(name)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, Err> Handler for HandlerFn<F>
where
    F: Fn(&RequestContext<'_>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<ResponseBody>, Err>> + Send + 'static,
    Err: Into<HandlerError>,
{
    async fn call(&self, ctx: &RequestContext<'_>, out: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        let response = (self.f)(ctx).await.map_err(Into::into)?;
        out.send(response).await?;
        Ok(())
    }
}

/// Wraps a function producing a whole response as a [`Handler`].
///
/// The returned future must not borrow the context, take what it needs
/// from the context before building it.
pub fn make_handler<F, Fut, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(&RequestContext<'_>) -> Fut,
    Fut: Future<Output = Result<Response<ResponseBody>, Err>>,
    Err: Into<HandlerError>,
{
    HandlerFn { f }
}
