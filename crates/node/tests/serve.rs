use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use edge_http::connection::ResponseWriter;
use edge_http::handler::{Handler, RequestContext, make_handler};
use edge_http::protocol::{HandlerError, PayloadSize, ResponseBody, ResponseHead};
use edge_http::tls::{ClientAuth, TlsTerminator};
use edge_node::config::NodeConfig;
use edge_node::error::ServerError;
use edge_node::plugin::{NodeEvent, Plugin, PluginError, PluginRegistry};
use edge_node::router::{Router, RouterBuilder, get};
use edge_node::server::Listener;
use edge_node::stats::NodeStats;
use edge_node::status;
use http::Response;
use indoc::indoc;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const ARTIFACT_SIZE: usize = 10 * 1024 * 1024;

struct TestNode {
    addr: SocketAddr,
    stats: Arc<NodeStats>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestNode {
    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

fn test_config() -> NodeConfig {
    NodeConfig { listen: "127.0.0.1:0".parse().unwrap(), idle_timeout_secs: 5, ..NodeConfig::default() }
}

fn artifact() -> Vec<u8> {
    (0..ARTIFACT_SIZE).map(|i| (i % 253) as u8).collect()
}

/// Streams a generated artifact without materializing it in the handler.
struct ArtifactHandler;

#[async_trait::async_trait]
impl Handler for ArtifactHandler {
    async fn call(&self, _ctx: &RequestContext<'_>, out: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        let mut source = Cursor::new(artifact());
        out.write_head(ResponseHead::default(), PayloadSize::Length(ARTIFACT_SIZE as u64)).await?;
        out.forward_body(&mut source).await?;
        Ok(())
    }
}

/// Returns without writing anything.
struct SilentHandler;

#[async_trait::async_trait]
impl Handler for SilentHandler {
    async fn call(&self, _ctx: &RequestContext<'_>, _out: &mut ResponseWriter<'_>) -> Result<(), HandlerError> {
        Ok(())
    }
}

fn routes(builder: RouterBuilder, stats: Arc<NodeStats>) -> Router {
    let failing = make_handler(|_ctx: &RequestContext<'_>| async {
        Err::<Response<ResponseBody>, HandlerError>("cache lookup failed".into())
    });
    let echo = make_handler(|ctx: &RequestContext<'_>| {
        let body = ctx.request().body().clone();
        async move { Ok::<_, HandlerError>(Response::new(ResponseBody::from(body))) }
    });

    status::routes(builder, stats)
        .route("/artifact", get(ArtifactHandler))
        .route("/fail", get(failing))
        .route("/silent", get(SilentHandler))
        .route("/echo", edge_node::router::post(echo))
        .build()
        .unwrap()
}

async fn start_with(listener: Listener) -> TestNode {
    let addr = listener.local_addr().unwrap();
    let stats = listener.stats();
    let router = routes(Router::builder(), Arc::clone(&stats));
    let (shutdown, signal) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        listener
            .serve_with_shutdown(router, async {
                let _ = signal.await;
            })
            .await
    });
    TestNode { addr, stats, shutdown, handle }
}

async fn start(config: NodeConfig) -> TestNode {
    start_with(Listener::bind(config).await.unwrap()).await
}

/// Reads a response head, returning it with its `Content-Length`.
async fn read_head<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) -> (String, usize) {
    let mut head = String::new();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        assert!(reader.read_line(&mut line).await.unwrap() > 0, "connection closed inside response head");
        if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse::<usize>().unwrap();
        }
        head.push_str(&line);
        if line == "\r\n" {
            break;
        }
    }
    (head, content_length)
}

/// Reads one response framed by `Content-Length`, returning the head and the body.
async fn read_response<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) -> (String, Vec<u8>) {
    let (head, content_length) = read_head(reader).await;
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await.unwrap();
    (head, body)
}

async fn assert_closed<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) {
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(5), reader.read_to_end(&mut rest)).await.unwrap().unwrap();
    assert_eq!(n, 0, "unexpected bytes: {}", String::from_utf8_lossy(&rest));
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn ping_keeps_connection_alive() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    for _ in 0..2 {
        stream.get_mut().write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let (head, body) = read_response(&mut stream).await;
        assert_eq!(head, "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n");
        assert_eq!(body, b"pong");
    }

    drop(stream);
    node.stop().await;
}

#[tokio::test]
async fn request_body_and_pipelining() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    let requests = indoc! {"
        POST /echo HTTP/1.1
        Content-Length: 5

        helloGET /ping HTTP/1.1

    "};
    stream.get_mut().write_all(requests.replace('\n', "\r\n").as_bytes()).await.unwrap();

    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"hello");
    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"pong");

    drop(stream);
    node.stop().await;
}

#[tokio::test]
async fn connection_close_is_honoured() {
    let node = start(test_config()).await;

    for request in [&b"GET /ping HTTP/1.1\r\nConnection: close\r\n\r\n"[..], b"GET /ping HTTP/1.0\r\n\r\n"] {
        let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());
        stream.get_mut().write_all(request).await.unwrap();
        let (_, body) = read_response(&mut stream).await;
        assert_eq!(body, b"pong");
        assert_closed(&mut stream).await;
    }

    node.stop().await;
}

#[tokio::test]
async fn keep_alive_disabled_by_config() {
    let node = start(NodeConfig { keep_alive: false, ..test_config() }).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    stream.get_mut().write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
    read_response(&mut stream).await;
    assert_closed(&mut stream).await;

    node.stop().await;
}

#[tokio::test]
async fn parse_error_answers_400_and_closes() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    stream.get_mut().write_all(b"HELLO THERE\r\n\r\n\r\n").await.unwrap();
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(head.contains("connection: close\r\n"));
    assert_closed(&mut stream).await;

    assert_eq!(node.stats.snapshot().connections_failed, 1);
    node.stop().await;
}

#[tokio::test]
async fn oversized_header_block_is_rejected() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    let mut raw = b"GET /ping HTTP/1.1\r\nX-Fill: ".to_vec();
    raw.resize(9000 - 4, b'a');
    raw.extend_from_slice(b"\r\n\r\n");
    stream.get_mut().write_all(&raw).await.unwrap();

    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert_closed(&mut stream).await;

    node.stop().await;
}

#[tokio::test]
async fn handler_error_answers_500_and_closes() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    stream.get_mut().write_all(b"GET /fail HTTP/1.1\r\n\r\n").await.unwrap();
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert_closed(&mut stream).await;

    node.stop().await;
}

#[tokio::test]
async fn handler_without_response_answers_500() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    stream.get_mut().write_all(b"GET /silent HTTP/1.1\r\n\r\n").await.unwrap();
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert_closed(&mut stream).await;

    wait_until(|| node.stats.snapshot().connections_failed == 1).await;
    assert_eq!(node.stats.snapshot().requests_served, 0);
    node.stop().await;
}

#[tokio::test]
async fn head_response_has_no_body_and_keeps_connection() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    stream.get_mut().write_all(b"HEAD /ping HTTP/1.1\r\n\r\nHEAD /artifact HTTP/1.1\r\n\r\n").await.unwrap();
    let (head, content_length) = read_head(&mut stream).await;
    assert_eq!(head, "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n");
    assert_eq!(content_length, 4);
    let (head, _) = read_head(&mut stream).await;
    assert_eq!(head, format!("HTTP/1.1 200 OK\r\ncontent-length: {ARTIFACT_SIZE}\r\n\r\n"));

    stream.get_mut().write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert_eq!(head, "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n");
    assert_eq!(body, b"pong");

    drop(stream);
    wait_until(|| node.stats.snapshot().requests_served == 3).await;
    assert_eq!(node.stats.snapshot().connections_failed, 0);
    node.stop().await;
}

#[tokio::test]
async fn unknown_route_is_404_and_keeps_connection() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    stream.get_mut().write_all(b"GET /nothing HTTP/1.1\r\n\r\n").await.unwrap();
    let (head, _) = read_response(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));

    stream.get_mut().write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
    let (_, body) = read_response(&mut stream).await;
    assert_eq!(body, b"pong");

    drop(stream);
    node.stop().await;
}

#[tokio::test]
async fn forwards_ten_mebibyte_artifact() {
    let node = start(test_config()).await;
    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());

    stream.get_mut().write_all(b"GET /artifact HTTP/1.1\r\n\r\n").await.unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert!(head.contains(&format!("content-length: {ARTIFACT_SIZE}\r\n")));
    assert_eq!(body.len(), ARTIFACT_SIZE);
    assert!(body == artifact());

    drop(stream);
    node.stop().await;
}

#[tokio::test]
async fn stalled_peer_does_not_block_others() {
    let node = start(test_config()).await;

    let mut stalled = TcpStream::connect(node.addr).await.unwrap();
    stalled.write_all(b"GET /ping HTTP/1.1\r\n").await.unwrap();

    let mut stream = BufReader::new(TcpStream::connect(node.addr).await.unwrap());
    stream.get_mut().write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
    let (_, body) = tokio::time::timeout(Duration::from_secs(2), read_response(&mut stream)).await.unwrap();
    assert_eq!(body, b"pong");

    drop(stalled);
    drop(stream);
    node.stop().await;
}

#[tokio::test]
async fn connection_limit_queues_connections() {
    let node = start(NodeConfig { max_connections: Some(1), ..test_config() }).await;

    let mut first = BufReader::new(TcpStream::connect(node.addr).await.unwrap());
    first.get_mut().write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
    read_response(&mut first).await;

    let mut second = BufReader::new(TcpStream::connect(node.addr).await.unwrap());
    second.get_mut().write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
    let waiting = tokio::time::timeout(Duration::from_millis(300), read_response(&mut second)).await;
    assert!(waiting.is_err(), "second connection served while the first holds the only slot");

    drop(first);
    let (_, body) = tokio::time::timeout(Duration::from_secs(5), read_response(&mut second)).await.unwrap();
    assert_eq!(body, b"pong");

    drop(second);
    node.stop().await;
}

#[tokio::test]
async fn concurrent_clients() {
    let node = start(test_config()).await;
    let addr = node.addr;

    let clients = (0..16)
        .map(|_| {
            tokio::spawn(async move {
                let mut stream = BufReader::new(TcpStream::connect(addr).await.unwrap());
                for _ in 0..4 {
                    stream.get_mut().write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
                    let (_, body) = read_response(&mut stream).await;
                    assert_eq!(body, b"pong");
                }
            })
        })
        .collect::<Vec<_>>();
    for client in clients {
        client.await.unwrap();
    }

    // counters are updated after the response is flushed
    wait_until(|| node.stats.snapshot().requests_served == 64).await;
    assert_eq!(node.stats.snapshot().connections_accepted, 16);
    node.stop().await;
}

fn generate_self_signed() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    (vec![cert.cert.der().clone()], key.into())
}

async fn tls_connect(addr: SocketAddr, certs: &[CertificateDer<'static>]) -> impl AsyncRead + AsyncWrite + Unpin {
    let mut roots = rustls::RootCertStore::empty();
    for cert in certs {
        roots.add(cert.clone()).unwrap();
    }
    let config = rustls::ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));

    let tcp_stream = TcpStream::connect(addr).await.unwrap();
    connector.connect(ServerName::try_from("localhost").unwrap(), tcp_stream).await.unwrap()
}

#[tokio::test]
async fn ping_over_tls() {
    let (certs, key) = generate_self_signed();
    let tls = TlsTerminator::from_der(certs.clone(), key, ClientAuth::None).unwrap();
    let node = start_with(Listener::bind(test_config()).await.unwrap().with_tls(tls)).await;

    let mut stream = BufReader::new(tls_connect(node.addr, &certs).await);
    stream.get_mut().write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
    let (head, body) = read_response(&mut stream).await;
    assert_eq!(head, "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n");
    assert_eq!(body, b"pong");

    drop(stream);
    node.stop().await;
}

#[tokio::test]
async fn tls_session_closed_without_request() {
    let plugin = Arc::new(RecordingPlugin::default());
    let mut plugins = PluginRegistry::new();
    plugins.register("recorder", plugin.clone()).unwrap();

    let (certs, key) = generate_self_signed();
    let tls = TlsTerminator::from_der(certs.clone(), key, ClientAuth::None).unwrap();
    let listener = Listener::bind(test_config()).await.unwrap().with_tls(tls).with_plugins(plugins);
    let node = start_with(listener).await;

    let mut stream = tls_connect(node.addr, &certs).await;
    stream.shutdown().await.unwrap();

    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await.unwrap().unwrap_or(0);
    assert_eq!(n, 0);

    wait_until(|| node.stats.snapshot().connections_failed == 1).await;
    node.stop().await;

    let events = plugin.events.lock().unwrap().clone();
    assert!(events.contains(&NodeEvent::ConnectionFailed { category: "ReadError" }), "{events:?}");
    assert!(!events.contains(&NodeEvent::ConnectionFailed { category: "TlsHandshakeError" }), "{events:?}");
}

#[derive(Default)]
struct RecordingPlugin {
    events: Mutex<Vec<NodeEvent>>,
}

impl Plugin for RecordingPlugin {
    fn start(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn stop(&self) {}

    fn on_event(&self, event: &NodeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn plugins_observe_lifecycle() {
    let plugin = Arc::new(RecordingPlugin::default());
    let mut plugins = PluginRegistry::new();
    plugins.register("recorder", plugin.clone()).unwrap();

    let node = start_with(Listener::bind(test_config()).await.unwrap().with_plugins(plugins)).await;
    let addr = node.addr;

    let mut stream = BufReader::new(TcpStream::connect(addr).await.unwrap());
    stream.get_mut().write_all(b"BROKEN\r\n\r\n\r\n\r\n").await.unwrap();
    read_response(&mut stream).await;
    assert_closed(&mut stream).await;

    node.stop().await;

    let events = plugin.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            NodeEvent::Started { local_addr: addr },
            NodeEvent::ConnectionFailed { category: "ParseError" },
            NodeEvent::Stopped,
        ]
    );
}

#[tokio::test]
async fn shutdown_waits_for_live_connections() {
    let plugin = Arc::new(RecordingPlugin::default());
    let mut plugins = PluginRegistry::new();
    plugins.register("recorder", plugin.clone()).unwrap();

    let config = NodeConfig { idle_timeout_secs: 1, ..test_config() };
    let node = start_with(Listener::bind(config).await.unwrap().with_plugins(plugins)).await;
    let addr = node.addr;

    // a partial request keeps the connection task alive until the read times out
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"GET /ping HTTP/1.1\r\n").await.unwrap();
    wait_until(|| node.stats.snapshot().connections_accepted == 1).await;

    node.stop().await;

    let events = plugin.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            NodeEvent::Started { local_addr: addr },
            NodeEvent::ConnectionFailed { category: "ReadError" },
            NodeEvent::Stopped,
        ]
    );
    drop(stalled);
}

#[tokio::test]
async fn bind_conflict_is_fatal() {
    let node = start(test_config()).await;

    let result = Listener::bind(NodeConfig { listen: node.addr, ..test_config() }).await;
    assert!(matches!(result, Err(ServerError::Bind { .. })));

    node.stop().await;
}
