//! Listener and per-connection handling.
//!
//! The listener accepts in a loop and hands every connection to its own
//! task. A connection task terminates TLS if configured, then runs handling
//! cycles: capture a request, route it, emit the response. It loops for as
//! long as both sides keep the connection alive and every cycle succeeds.

use std::future::{Future, pending};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use edge_http::connection::{Connection, RequestLimits, RequestReader, ResponseWriter};
use edge_http::handler::{Handler, PathParams, RequestContext};
use edge_http::protocol::{CycleError, ReadError};
use edge_http::tls::TlsTerminator;
use http::{HeaderValue, StatusCode, header};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::ServerError;
use crate::plugin::{NodeEvent, PluginRegistry};
use crate::router::{Router, status_response};
use crate::stats::NodeStats;

pub struct Listener {
    tcp_listener: TcpListener,
    config: NodeConfig,
    tls: TlsTerminator,
    stats: Arc<NodeStats>,
    plugins: Arc<PluginRegistry>,
}

impl Listener {
    /// Validates `config`, prepares TLS and binds the listen address.
    pub async fn bind(config: NodeConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let tls = config.tls_terminator()?;

        let tcp_listener =
            TcpListener::bind(config.listen).await.map_err(|e| ServerError::Bind { addr: config.listen, source: e })?;
        info!(
            address = %tcp_listener.local_addr()?,
            tls = tls.is_enabled(),
            max_connections = ?config.max_connections,
            "listener bound"
        );

        Ok(Self { tcp_listener, config, tls, stats: Arc::new(NodeStats::new()), plugins: Arc::new(PluginRegistry::new()) })
    }

    /// Replaces the terminator built from the configuration.
    pub fn with_tls(mut self, tls: TlsTerminator) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = Arc::new(plugins);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.tcp_listener.local_addr()?)
    }

    pub fn stats(&self) -> Arc<NodeStats> {
        Arc::clone(&self.stats)
    }

    pub async fn serve(self, router: Router) -> Result<(), ServerError> {
        self.serve_with_shutdown(router, pending()).await
    }

    /// Serves until `signal` resolves.
    ///
    /// Accepting stops as soon as the signal fires. Connections already
    /// accepted run to completion before plugins see `Stopped`.
    pub async fn serve_with_shutdown<F>(self, router: Router, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let local_addr = self.local_addr()?;
        self.plugins.start_all()?;
        self.plugins.dispatch(&NodeEvent::Started { local_addr });
        info!(address = %local_addr, "start listening");

        let session = Arc::new(Session {
            router,
            tls: self.tls,
            stats: self.stats,
            plugins: Arc::clone(&self.plugins),
            limits: self.config.limits(),
            read_buffer_size: self.config.read_buffer_size,
            keep_alive: self.config.keep_alive,
            handshake_timeout: self.config.idle_timeout(),
        });
        let connection_limit = self.config.max_connections.map(|n| Arc::new(Semaphore::new(n)));
        let connections = TaskTracker::new();

        tokio::pin!(signal);
        loop {
            let permit = match &connection_limit {
                Some(semaphore) => tokio::select! {
                    permit = Arc::clone(semaphore).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_closed) => break,
                    },
                    () = &mut signal => break,
                },
                None => None,
            };

            let (tcp_stream, peer_addr) = tokio::select! {
                accepted = self.tcp_listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        session.fail(&CycleError::accept(e), None);
                        continue;
                    }
                },
                () = &mut signal => break,
            };

            session.stats.record_accepted();
            trace!(%peer_addr, "connection accepted");

            let session = Arc::clone(&session);
            connections.spawn(async move {
                session.run(tcp_stream, peer_addr).await;
                drop(permit);
            });
        }

        info!(address = %local_addr, live_connections = connections.len(), "stop listening");
        connections.close();
        connections.wait().await;

        self.plugins.dispatch(&NodeEvent::Stopped);
        self.plugins.stop_all();
        Ok(())
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.tcp_listener.local_addr().ok())
            .field("tls", &self.tls)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

/// State shared by every connection task.
struct Session {
    router: Router,
    tls: TlsTerminator,
    stats: Arc<NodeStats>,
    plugins: Arc<PluginRegistry>,
    limits: RequestLimits,
    read_buffer_size: usize,
    keep_alive: bool,
    handshake_timeout: Duration,
}

impl Session {
    async fn run(&self, tcp_stream: TcpStream, peer_addr: SocketAddr) {
        let stream = match tokio::time::timeout(self.handshake_timeout, self.tls.wrap(tcp_stream)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.fail(&e, Some(peer_addr));
                return;
            }
            Err(_elapsed) => {
                self.fail(&CycleError::tls_handshake(io::Error::from(io::ErrorKind::TimedOut)), Some(peer_addr));
                return;
            }
        };

        let mut connection = Connection::from_boxed(stream, Some(peer_addr), self.read_buffer_size);
        let mut reader = RequestReader::new(self.limits);

        loop {
            match self.cycle(&mut connection, &mut reader).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.fail(&e, Some(peer_addr));
                    break;
                }
            }
        }

        connection.close().await;
        debug!(connection_id = %connection.id(), %peer_addr, served = reader.served(), "connection closed");
    }

    /// Runs one handling cycle, returning whether the connection stays open for another.
    async fn cycle(&self, connection: &mut Connection, reader: &mut RequestReader) -> Result<bool, CycleError> {
        let request = match reader.next_request(connection).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(false),
            Err(e @ CycleError::Parse { .. }) => {
                self.reject(connection, StatusCode::BAD_REQUEST).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let connection_id = connection.id();
        debug!(
            %connection_id,
            method = %request.method(),
            target = request.target(),
            version = ?request.version(),
            "received request"
        );

        let params = PathParams::new();
        let ctx = RequestContext::new(&request, &params, connection_id, connection.peer_addr());
        let mut out = ResponseWriter::for_method(connection, request.method());

        let result = match self.router.call(&ctx, &mut out).await {
            Ok(()) if !out.head_sent() => Err(CycleError::handler("handler returned without a response")),
            Ok(()) => Ok(()),
            Err(e) => Err(CycleError::handler(e)),
        };
        if let Err(e) = result {
            if !out.head_sent() {
                let mut response = status_response(StatusCode::INTERNAL_SERVER_ERROR);
                response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
                if let Err(send_error) = out.send(response).await {
                    debug!(%connection_id, cause = %send_error, "send error response failed");
                }
            }
            self.stats.add_bytes_sent(out.bytes_written());
            return Err(e);
        }

        self.stats.add_bytes_sent(out.bytes_written());
        self.stats.record_served();

        let keep_alive = self.keep_alive && request.is_keep_alive() && out.is_reusable();
        trace!(%connection_id, status = ?out.status(), keep_alive, "response sent");
        Ok(keep_alive)
    }

    /// Best effort error response before the connection is closed.
    async fn reject(&self, connection: &mut Connection, status: StatusCode) {
        let mut response = status_response(status);
        response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));

        let mut out = ResponseWriter::new(connection);
        if let Err(e) = out.send(response).await {
            debug!(cause = %e, "send error response failed");
        }
        self.stats.add_bytes_sent(out.bytes_written());
    }

    fn fail(&self, error: &CycleError, peer_addr: Option<SocketAddr>) {
        let category = error.category();
        match error {
            // a client dropping an idle connection is routine
            CycleError::Read { source: ReadError::PeerClosed } => {
                debug!(category, ?peer_addr, cause = %error, "connection ended");
            }
            _ => warn!(category, ?peer_addr, cause = %error, "handling cycle failed"),
        }
        self.stats.record_failed();
        self.plugins.dispatch(&NodeEvent::ConnectionFailed { category });
    }
}
