//! Integration tests for the PPT client against an in-process fake BES
//!
//! The fake server speaks the real wire protocol over a loopback socket:
//! handshake, chunked requests and responses, and the exit token on close.

use olfs_bes::ppt::framed::FramedStream;
use olfs_bes::ppt::handshake::{CLIENT_TESTING, EXIT_NOW, PROTOCOL_UNDEFINED, SERVER_OK};
use olfs_bes::ppt::{Client, TransportConfig};
use olfs_bes::{BesBackend, BesError, Document, Element, PptBackend, TextResponseParser};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

enum Reply {
    Data(Vec<u8>),
    Error(Vec<u8>),
}

#[derive(Debug, Default)]
struct ServerLog {
    requests: Vec<String>,
    farewell: Option<String>,
}

fn quick_config() -> TransportConfig {
    TransportConfig::builder()
        .connect_timeout(Duration::from_secs(5))
        .handshake_eof_retries(0)
        .build()
}

async fn accept_with_handshake(listener: TcpListener) -> TcpStream {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut hello = vec![0u8; CLIENT_TESTING.len()];
    socket.read_exact(&mut hello).await.unwrap();
    assert_eq!(hello, CLIENT_TESTING.as_bytes());
    socket.write_all(SERVER_OK.as_bytes()).await.unwrap();
    socket
}

/// Serve requests on one connection until the client leaves.
async fn serve<F>(socket: TcpStream, handler: F) -> ServerLog
where
    F: Fn(&[u8]) -> Reply,
{
    let mut framed = FramedStream::new(socket);
    let mut log = ServerLog::default();

    loop {
        let mut first = [0u8; 1];
        let n = framed.get_mut().peek(&mut first).await.unwrap_or(0);
        if n == 0 {
            break;
        }

        // chunk headers start with a hex digit; the exit token does not
        if first[0] == b'<' {
            let mut rest = Vec::new();
            let _ = framed.get_mut().read_to_end(&mut rest).await;
            log.farewell = Some(String::from_utf8_lossy(&rest).into_owned());
            break;
        }

        let mut request = Vec::new();
        let mut errors = Vec::new();
        if framed.read_message(&mut request, &mut errors).await.is_err() {
            break;
        }
        log.requests.push(String::from_utf8_lossy(&request).into_owned());

        let written = match handler(&request) {
            Reply::Data(data) => framed.write_message(&data).await,
            Reply::Error(detail) => framed.write_error_message(&detail).await,
        };
        if written.is_err() {
            break;
        }
    }

    log
}

async fn fake_bes<F>(handler: F) -> (u16, JoinHandle<ServerLog>)
where
    F: Fn(&[u8]) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let socket = accept_with_handshake(listener).await;
        serve(socket, handler).await
    });
    (port, task)
}

fn echo(request: &[u8]) -> Reply {
    let mut reply = b"ok:".to_vec();
    reply.extend_from_slice(request);
    Reply::Data(reply)
}

#[tokio::test]
async fn test_execute_commands_round_trip() {
    let (port, server) = fake_bes(echo).await;

    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap();
    assert!(client.is_running());

    let mut data = Vec::new();
    let mut errors = Vec::new();
    let ok = client
        .execute_commands("show version; show status", &mut data, &mut errors)
        .await
        .unwrap();

    assert!(ok);
    assert_eq!(data, b"ok:show version;ok:show status;");
    assert!(errors.is_empty());
    assert_eq!(client.commands_sent(), 2);

    client.close(true).await.unwrap();
    assert!(client.is_closed());

    let log = server.await.unwrap();
    assert_eq!(log.requests, vec!["show version;", "show status;"]);
    assert_eq!(log.farewell.as_deref(), Some(EXIT_NOW));
}

#[tokio::test]
async fn test_execute_commands_stops_at_first_error() {
    let (port, server) = fake_bes(|request: &[u8]| {
        if request.starts_with(b"bad") {
            Reply::Error(b"<BESError>no such command</BESError>".to_vec())
        } else {
            echo(request)
        }
    })
    .await;

    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap();

    let mut data = Vec::new();
    let mut errors = Vec::new();
    let ok = client
        .execute_commands("show a; bad; show c", &mut data, &mut errors)
        .await
        .unwrap();

    assert!(!ok);
    assert_eq!(data, b"ok:show a;");
    assert_eq!(errors, b"<BESError>no such command</BESError>");
    assert!(client.is_running());

    client.close(true).await.unwrap();
    let log = server.await.unwrap();
    assert_eq!(log.requests.len(), 2);
}

#[tokio::test]
async fn test_send_document() {
    let (port, server) = fake_bes(echo).await;
    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap();

    let request: Document = Element::new("request")
        .with_attribute("reqID", "7")
        .with_child(Element::new("showVersion"))
        .into();

    let mut data = Vec::new();
    let mut errors = Vec::new();
    assert!(client.send(&request, &mut data, &mut errors).await.unwrap());

    let expected = format!("ok:{}", request.to_xml());
    assert_eq!(String::from_utf8(data).unwrap(), expected);

    client.close(false).await.unwrap();
    let log = server.await.unwrap();
    assert!(log.farewell.is_none());
}

#[tokio::test]
async fn test_backend_error_keeps_connection_usable() {
    let (port, server) = fake_bes(|request: &[u8]| {
        if request == b"fail" {
            Reply::Error(b"denied".to_vec())
        } else {
            Reply::Data(b"fine".to_vec())
        }
    })
    .await;

    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap();

    let err = client.request_bytes(b"fail").await.unwrap_err();
    assert_eq!(err.as_backend().map(|e| e.message()), Some("denied"));
    assert!(client.is_running());

    let body = client.request_bytes(b"next").await.unwrap();
    assert_eq!(body, b"fine");

    client.close(true).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_large_response_spans_chunks() {
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();
    let (port, server) = fake_bes(move |_: &[u8]| Reply::Data(payload.clone())).await;

    let config = TransportConfig::builder()
        .handshake_eof_retries(0)
        .read_buffer_size(1024)
        .build();
    let mut client = Client::connect_with_config("127.0.0.1", port, config)
        .await
        .unwrap();

    let mut data = Vec::new();
    let mut errors = Vec::new();
    assert!(client
        .send_bytes(b"get data", &mut data, &mut errors)
        .await
        .unwrap());
    assert_eq!(data, expected);

    let body = client.request_bytes(b"again").await.unwrap();
    assert_eq!(body, expected);

    client.close(true).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_rejection_closes_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut hello = vec![0u8; CLIENT_TESTING.len()];
        socket.read_exact(&mut hello).await.unwrap();
        socket.write_all(PROTOCOL_UNDEFINED.as_bytes()).await.unwrap();

        let mut rest = Vec::new();
        socket.read_to_end(&mut rest).await.unwrap();
        rest
    });

    let err = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .err()
        .expect("connection should be rejected");
    assert!(matches!(err, BesError::HandshakeFailed(_)));

    // the client hung up without sending anything else
    let rest = server.await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_connection_loss_tears_client_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let socket = accept_with_handshake(listener).await;
        let mut framed = FramedStream::new(socket);
        let mut request = Vec::new();
        let mut errors = Vec::new();
        framed.read_message(&mut request, &mut errors).await.unwrap();
        // hang up without replying
    });

    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap();

    let mut data = Vec::new();
    let mut errors = Vec::new();
    let err = client
        .send_bytes(b"show version;", &mut data, &mut errors)
        .await
        .unwrap_err();
    assert!(err.is_connection_fatal());
    assert!(client.is_closed());

    let again = client
        .send_bytes(b"show version;", &mut data, &mut errors)
        .await
        .unwrap_err();
    assert!(matches!(again, BesError::ConnectionClosed(_)));

    // closing a torn-down client is a no-op
    client.close(true).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_read_timeout_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut socket = accept_with_handshake(listener).await;
        let mut everything = Vec::new();
        // never answers; returns once the client drops the socket
        socket.read_to_end(&mut everything).await.unwrap();
        everything
    });

    let config = TransportConfig::builder()
        .handshake_eof_retries(0)
        .read_timeout(Duration::from_millis(200))
        .build();
    let mut client = Client::connect_with_config("127.0.0.1", port, config)
        .await
        .unwrap();

    let err = client.request_bytes(b"slow;").await.unwrap_err();
    assert!(matches!(err, BesError::TransportMessage(_)));
    assert!(client.is_closed());

    let received = server.await.unwrap();
    assert!(received.ends_with(b"slow;0000000d"));
}

#[tokio::test]
async fn test_abandoned_request_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let socket = accept_with_handshake(listener).await;
        let mut framed = FramedStream::new(socket);
        let mut request = Vec::new();
        let mut errors = Vec::new();
        framed.read_message(&mut request, &mut errors).await.unwrap();

        // start a 16-byte chunk, deliver five bytes of it, then stall
        framed.get_mut().write_all(b"0000010dfirst").await.unwrap();

        let mut rest = Vec::new();
        let _ = framed.get_mut().read_to_end(&mut rest).await;
        rest
    });

    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap();

    let mut data = Vec::new();
    let mut errors = Vec::new();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        client.send_bytes(b"one;", &mut data, &mut errors),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(!client.is_running());

    let err = client
        .send_bytes(b"two;", &mut data, &mut errors)
        .await
        .unwrap_err();
    assert!(matches!(err, BesError::ConnectionClosed(_)));
    assert!(client.is_closed());
    client.close(true).await.unwrap();

    // the second request never reached the wire
    let rest = server.await.unwrap();
    assert!(!String::from_utf8_lossy(&rest).contains("two;"));
}

#[tokio::test]
async fn test_close_is_idempotent_and_kill_is_silent() {
    let (port, server) = fake_bes(echo).await;
    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap()
        .with_id("test-client");
    assert_eq!(client.id(), "test-client");

    client.close(true).await.unwrap();
    client.close(true).await.unwrap();
    client.kill();
    assert!(client.is_closed());

    let log = server.await.unwrap();
    assert_eq!(log.farewell.as_deref(), Some(EXIT_NOW));
}

#[tokio::test]
async fn test_kill_skips_exit_token() {
    let (port, server) = fake_bes(echo).await;
    let mut client = Client::connect_with_config("127.0.0.1", port, quick_config())
        .await
        .unwrap();

    client.kill();
    assert!(client.is_closed());

    let log = server.await.unwrap();
    assert!(log.farewell.is_none());
    assert!(log.requests.is_empty());
}

#[tokio::test]
async fn test_ppt_backend_transaction() {
    let (port, server) =
        fake_bes(|_: &[u8]| Reply::Data(b"<catalog name=\"/data\"/>".to_vec())).await;

    let backend = PptBackend::new("127.0.0.1", port, Arc::new(TextResponseParser))
        .with_config(quick_config());
    let request: Document = Element::new("request")
        .with_child(Element::new("showCatalog").with_attribute("node", "/data"))
        .into();

    let response = backend.transaction(&request).await.unwrap();
    assert_eq!(response.root().text_content(), "<catalog name=\"/data\"/>");

    let log = server.await.unwrap();
    assert_eq!(log.requests, vec![request.to_xml()]);
    assert_eq!(log.farewell.as_deref(), Some(EXIT_NOW));
}

#[tokio::test]
async fn test_ppt_backend_reports_bes_error() {
    let (port, server) = fake_bes(|_: &[u8]| Reply::Error(b"no such node".to_vec())).await;

    let backend = PptBackend::new("127.0.0.1", port, Arc::new(TextResponseParser))
        .with_config(quick_config());
    let request: Document = Element::new("request").into();

    let err = backend.transaction(&request).await.unwrap_err();
    assert_eq!(err.as_backend().map(|e| e.message()), Some("no such node"));
    server.await.unwrap();
}
