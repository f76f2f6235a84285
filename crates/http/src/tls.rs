//! Optional TLS termination of accepted streams.
//!
//! A [`TlsTerminator`] is either disabled, passing plain streams through, or
//! holds a rustls server configuration built from the node certificate. The
//! session it returns owns the underlying stream, so closing the session
//! closes the socket.
//!
//! Client certificates are never accepted blindly: [`ClientAuth::None`] does
//! not ask for one and asserts nothing about the peer, while
//! [`ClientAuth::Required`] validates the presented chain against the
//! configured roots.

use std::fmt;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tracing::trace;

use crate::connection::BoxedStream;
use crate::protocol::CycleError;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("can't read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("no certificate found in {}", path.display())]
    NoCertificate { path: PathBuf },

    #[error("no private key found in {}", path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("invalid tls configuration: {source}")]
    Config {
        #[from]
        source: rustls::Error,
    },

    #[error("invalid client certificate roots: {source}")]
    Verifier {
        #[from]
        source: VerifierBuilderError,
    },
}

impl TlsError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// Client certificate policy.
#[derive(Debug, Clone, Default)]
pub enum ClientAuth {
    /// Encryption only, no client certificate is requested.
    #[default]
    None,
    /// A client certificate chaining to one of `roots` is mandatory.
    Required { roots: Arc<RootCertStore> },
}

impl ClientAuth {
    /// Requires client certificates issued by the CAs in the PEM file at `ca_path`.
    pub fn required_from_pem_file(ca_path: impl AsRef<Path>) -> Result<Self, TlsError> {
        let ca_path = ca_path.as_ref();
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots.add(cert)?;
        }
        Ok(Self::Required { roots: Arc::new(roots) })
    }
}

#[derive(Clone, Default)]
pub struct TlsTerminator {
    acceptor: Option<TlsAcceptor>,
    client_auth_required: bool,
}

impl TlsTerminator {
    /// A terminator that hands streams back unchanged.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_der(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        client_auth: ClientAuth,
    ) -> Result<Self, TlsError> {
        let builder = ServerConfig::builder();
        let (config, client_auth_required) = match client_auth {
            ClientAuth::None => (builder.with_no_client_auth().with_single_cert(certs, key)?, false),
            ClientAuth::Required { roots } => {
                let verifier = WebPkiClientVerifier::builder(roots).build()?;
                (builder.with_client_cert_verifier(verifier).with_single_cert(certs, key)?, true)
            }
        };

        Ok(Self { acceptor: Some(TlsAcceptor::from(Arc::new(config))), client_auth_required })
    }

    /// Loads the certificate chain and private key from PEM files.
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        client_auth: ClientAuth,
    ) -> Result<Self, TlsError> {
        let certs = load_certs(cert_path.as_ref())?;
        let key = load_private_key(key_path.as_ref())?;
        Self::from_der(certs, key, client_auth)
    }

    pub fn is_enabled(&self) -> bool {
        self.acceptor.is_some()
    }

    pub fn client_auth_required(&self) -> bool {
        self.client_auth_required
    }

    /// Runs the server side handshake over `stream`.
    ///
    /// When disabled the stream is only boxed.
    pub async fn wrap<S>(&self, stream: S) -> Result<BoxedStream, CycleError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let Some(acceptor) = &self.acceptor else {
            return Ok(Box::new(stream));
        };

        let tls_stream = acceptor.accept(stream).await.map_err(CycleError::tls_handshake)?;
        let (_, session) = tls_stream.get_ref();
        trace!(protocol = ?session.protocol_version(), cipher_suite = ?session.negotiated_cipher_suite(), "tls handshake finished");
        Ok(Box::new(tls_stream))
    }
}

impl fmt::Debug for TlsTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTerminator")
            .field("enabled", &self.is_enabled())
            .field("client_auth_required", &self.client_auth_required)
            .finish()
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::io(path, e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::io(path, e))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate { path: path.to_path_buf() });
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::io(path, e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsError::io(path, e))?
        .ok_or_else(|| TlsError::NoPrivateKey { path: path.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, RequestLimits, RequestReader};
    use crate::protocol::ReadError;
    use rustls::pki_types::{PrivatePkcs8KeyDer, ServerName};
    use rustls::{ClientConfig, RootCertStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio_rustls::TlsConnector;

    fn generate_self_signed() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        (vec![cert.cert.der().clone()], key.into())
    }

    fn connector(certs: &[CertificateDer<'static>]) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        for cert in certs {
            roots.add(cert.clone()).unwrap();
        }
        let config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    #[tokio::test]
    async fn disabled_passes_stream_through() {
        let (mut client, server) = duplex(64);
        let terminator = TlsTerminator::disabled();
        assert!(!terminator.is_enabled());

        let stream = terminator.wrap(server).await.unwrap();
        let mut connection = Connection::from_boxed(stream, None, 64);
        client.write_all(b"plain").await.unwrap();
        assert_eq!(&connection.bounded_read(64).await.unwrap()[..], b"plain");
    }

    #[tokio::test]
    async fn handshake_then_zero_byte_read() {
        let (certs, key) = generate_self_signed();
        let terminator = TlsTerminator::from_der(certs.clone(), key, ClientAuth::None).unwrap();
        let connector = connector(&certs);

        let (client_io, server_io) = duplex(16 * 1024);
        let client = tokio::spawn(async move {
            let server_name = ServerName::try_from("localhost").unwrap();
            let mut tls = connector.connect(server_name, client_io).await.unwrap();
            tls.shutdown().await.unwrap();
            // stay connected until the server closes, it still flushes session tickets
            let mut rest = Vec::new();
            let _ = tls.read_to_end(&mut rest).await;
            rest
        });

        let stream = terminator.wrap(server_io).await.unwrap();
        let mut connection = Connection::from_boxed(stream, None, 8192);
        let mut reader = RequestReader::new(RequestLimits::default());

        let result = reader.next_request(&mut connection).await;
        assert!(matches!(result, Err(CycleError::Read { source: ReadError::PeerClosed })));

        connection.close().await;
        assert!(connection.is_closed());
        assert!(client.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn plaintext_peer_fails_handshake() {
        let (certs, key) = generate_self_signed();
        let terminator = TlsTerminator::from_der(certs, key, ClientAuth::None).unwrap();

        let (mut client, server) = duplex(1024);
        client.write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();

        let err = terminator.wrap(server).await.err().unwrap();
        assert_eq!(err.category(), "TlsHandshakeError");
    }

    #[tokio::test]
    async fn required_client_auth_rejects_anonymous_peer() {
        let (certs, key) = generate_self_signed();
        let mut roots = RootCertStore::empty();
        roots.add(certs[0].clone()).unwrap();
        let client_auth = ClientAuth::Required { roots: Arc::new(roots) };

        let terminator = TlsTerminator::from_der(certs.clone(), key, client_auth).unwrap();
        assert!(terminator.client_auth_required());
        let connector = connector(&certs);

        let (client_io, server_io) = duplex(16 * 1024);
        tokio::spawn(async move {
            let server_name = ServerName::try_from("localhost").unwrap();
            let _ = connector.connect(server_name, client_io).await;
        });

        let err = terminator.wrap(server_io).await.err().unwrap();
        assert!(matches!(err, CycleError::TlsHandshake { .. }));
    }

    #[test]
    fn pem_files_roundtrip_through_disk() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = std::env::temp_dir().join(format!("edge-http-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert_path = dir.join("node.crt");
        let key_path = dir.join("node.key");
        std::fs::write(&cert_path, cert.cert.pem()).unwrap();
        std::fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();

        let terminator = TlsTerminator::from_pem_files(&cert_path, &key_path, ClientAuth::None).unwrap();
        assert!(terminator.is_enabled());

        let client_auth = ClientAuth::required_from_pem_file(&cert_path).unwrap();
        assert!(matches!(client_auth, ClientAuth::Required { .. }));

        let missing = TlsTerminator::from_pem_files(dir.join("missing.crt"), &key_path, ClientAuth::None);
        assert!(matches!(missing, Err(TlsError::Io { .. })));

        let no_key = TlsTerminator::from_pem_files(&cert_path, &cert_path, ClientAuth::None);
        assert!(matches!(no_key, Err(TlsError::NoPrivateKey { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
