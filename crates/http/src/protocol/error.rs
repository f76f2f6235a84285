use std::error::Error;
use std::io;
use thiserror::Error;

/// Error type returned by request handlers.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Failure of one handling cycle on a connection.
///
/// Every variant is caught at the cycle boundary, logged together with its
/// [`category`](CycleError::category) and resolved by closing the connection.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("accept error: {source}")]
    Accept { source: io::Error },

    #[error("tls handshake error: {source}")]
    TlsHandshake { source: io::Error },

    #[error("read error: {source}")]
    Read {
        #[from]
        source: ReadError,
    },

    #[error("request error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("handler error: {source}")]
    Handler { source: HandlerError },
}

impl CycleError {
    pub fn accept(e: io::Error) -> Self {
        Self::Accept { source: e }
    }

    pub fn tls_handshake(e: io::Error) -> Self {
        Self::TlsHandshake { source: e }
    }

    pub fn handler<E: Into<HandlerError>>(e: E) -> Self {
        Self::Handler { source: e.into() }
    }

    /// Stable name of the error kind, used as a structured logging field.
    pub fn category(&self) -> &'static str {
        match self {
            CycleError::Accept { .. } => "ConnectionAcceptError",
            CycleError::TlsHandshake { .. } => "TlsHandshakeError",
            CycleError::Read { .. } => "ReadError",
            CycleError::Parse { .. } => "ParseError",
            CycleError::Send { .. } | CycleError::Handler { .. } => "RoutingOrEmissionError",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("no data received within {secs}s")]
    Timeout { secs: u64 },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("empty request buffer")]
    Empty,

    #[error("incomplete request header, only {received} bytes received")]
    Incomplete { received: usize },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("transfer-encoding is not supported")]
    UnsupportedTransferEncoding,

    #[error("body size too large, declared: {declared} exceed the limit {max_size}")]
    TooLargeBody { declared: u64, max_size: u64 },

    #[error("incomplete body, declared: {declared} but only {received} bytes received")]
    IncompleteBody { declared: u64, received: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn too_large_body(declared: u64, max_size: u64) -> Self {
        Self::TooLargeBody { declared, max_size }
    }

    pub fn incomplete_body(declared: u64, received: usize) -> Self {
        Self::IncompleteBody { declared, received }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response head already sent")]
    HeadAlreadySent,

    #[error("response head must be sent before the body")]
    HeadNotSent,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }
}
