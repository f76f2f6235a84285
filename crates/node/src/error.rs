use std::io;
use std::net::SocketAddr;

use edge_http::tls::TlsError;
use thiserror::Error;

use crate::plugin::PluginError;

/// Errors that prevent the node from starting or keep it from serving.
///
/// Failures of a single connection never surface here, they are logged and
/// resolved by closing that connection.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("can't bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("tls setup error: {source}")]
    Tls {
        #[from]
        source: TlsError,
    },

    #[error("plugin error: {source}")]
    Plugin {
        #[from]
        source: PluginError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ServerError {
    pub fn config<S: ToString>(reason: S) -> Self {
        Self::Config { reason: reason.to_string() }
    }
}
