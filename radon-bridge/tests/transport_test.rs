use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use radon_bridge::metro::DebugPage;
use radon_bridge::{BridgeError, MetroClient};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn unreachable_endpoint_fails_fast_with_transport_error() {
    let client = MetroClient::new();
    let started = Instant::now();
    let err = client
        .fetch_logs_http(free_port(), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Transport(_) | BridgeError::Timeout(_)
    ));
    // Connection refused resolves well inside the window; nothing hangs.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn status_of_unreachable_port_is_not_running() {
    let client = MetroClient::new();
    let status = client.status(free_port()).await;
    assert!(!status.running);
    assert!(status.status.is_none());
}

#[tokio::test]
async fn plain_endpoint_body_is_returned_verbatim() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let body = "line1\nline2\nline3";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
    });

    let client = MetroClient::new();
    let chunk = client
        .fetch_logs_http(port, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(chunk.text, "line1\nline2\nline3");
    assert_eq!(chunk.line_count(), 3);
}

#[tokio::test]
async fn non_success_status_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let response = "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        socket.write_all(response.as_bytes()).await.unwrap();
    });

    let client = MetroClient::new();
    let err = client
        .fetch_logs_http(port, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Transport(_)));
}

fn console_event(text: &str) -> String {
    json!({
        "method": "Runtime.consoleAPICalled",
        "params": {"type": "log", "args": [{"type": "string", "value": text}]}
    })
    .to_string()
}

fn debug_page(port: u16) -> DebugPage {
    DebugPage {
        title: "React Native".to_string(),
        description: "React Native app".to_string(),
        web_socket_debugger_url: Some(format!("ws://127.0.0.1:{port}/inspector/debug")),
    }
}

#[tokio::test]
async fn debugger_session_returns_partial_logs_at_deadline() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // A session that emits a few events and then goes quiet without
    // ever closing; only the deadline can end the collection.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let enable = ws.next().await.unwrap().unwrap();
        assert!(enable.to_text().unwrap().contains("Runtime.enable"));
        for i in 0..3 {
            ws.send(Message::Text(console_event(&format!("sim log {i}"))))
                .await
                .unwrap();
        }
        std::future::pending::<()>().await;
    });

    let client = MetroClient::new();
    let started = Instant::now();
    let chunk = client
        .collect_console_events(&debug_page(port), Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(chunk.text, "sim log 0\nsim log 1\nsim log 2");
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn debugger_session_close_resolves_with_partial_logs() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = ws.next().await;
        ws.send(Message::Text(console_event("only line")))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
    });

    let client = MetroClient::new();
    let started = Instant::now();
    let chunk = client
        .collect_console_events(&debug_page(port), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(chunk.text, "only line");
    // The close ends collection long before the window would.
    assert!(started.elapsed() < Duration::from_secs(5));
}
