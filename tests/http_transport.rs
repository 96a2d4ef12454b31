//! `HttpTransport` against a hand-rolled HTTP responder: form encoding,
//! empty success bodies, status errors and the response size cap.

use std::time::Duration;

use gridnotes::client::{CommentClient, HttpTransport, MAX_RESPONSE_BYTES};
use gridnotes::error::GridnotesError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

/// Helper: bind a TCP listener on localhost and return (listener, port).
async fn mock_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Helper: read one request, headers and form body, as text.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        let Some(end) = text.find("\r\n\r\n") else {
            continue;
        };
        let body_len = text[..end]
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Helper: answer a single request with `response` and hand back the
/// request text.
fn respond_once(listener: TcpListener, response: Vec<u8>) -> JoinHandle<String> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(&response).await.unwrap();
        let _ = socket.shutdown().await;
        request
    })
}

fn client(port: u16) -> CommentClient<HttpTransport> {
    let transport = HttpTransport::new(
        format!("http://127.0.0.1:{port}/comments"),
        Duration::from_secs(5),
    )
    .unwrap();
    CommentClient::new(transport)
}

// ---------------------------------------------------------------------------
// Success bodies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_body_counts_as_success() {
    let (listener, port) = mock_listener().await;
    let server = respond_once(
        listener,
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
    );

    assert_ok!(client(port).delete_entry("7".parse().unwrap()).await);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /comments"));
    assert!(request.ends_with("method=delete&id=7"), "{request}");
}

#[tokio::test]
async fn entry_list_is_parsed() {
    let (listener, port) = mock_listener().await;
    let body = r#"["1;2024-01-10=;alice;hi",""]"#;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let server = respond_once(listener, response.into_bytes());

    let entries = assert_ok!(client(port).fetch_entries(&["2024-01-10".to_string()]).await);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].comment.text, "hi");
    assert_eq!(entries[0].author.name, "alice");

    let request = server.await.unwrap();
    assert!(request.ends_with("method=get&dates%5B%5D=2024-01-10"), "{request}");
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_status_is_a_retryable_transport_error() {
    let (listener, port) = mock_listener().await;
    let server = respond_once(
        listener,
        b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_vec(),
    );

    let err = assert_err!(client(port).delete_entry("7".parse().unwrap()).await);
    assert!(matches!(err, GridnotesError::Transport(ref msg) if msg.contains("503")));
    assert!(err.is_retryable());
    server.await.unwrap();
}

#[tokio::test]
async fn oversized_response_is_refused() {
    let (listener, port) = mock_listener().await;
    // Only the declared length is sent; the client must refuse before
    // reading any body.
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        MAX_RESPONSE_BYTES + 1
    );
    let server = respond_once(listener, response.into_bytes());

    let err = assert_err!(client(port).fetch_entries(&["2024-01-10".to_string()]).await);
    assert!(matches!(err, GridnotesError::Transport(ref msg) if msg == "response too large"));
    server.await.unwrap();
}
