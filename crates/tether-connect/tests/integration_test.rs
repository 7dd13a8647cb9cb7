//! Integration tests for tether-connect
//!
//! These tests run the HttpInvoker against a throwaway TCP responder that
//! captures the raw request and answers with a canned HTTP response.

use serde_json::{json, Value};
use std::time::Duration;
use tether_connect::HttpInvoker;
use tether_core_interface::Invoker;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accept one connection, answer it, and hand back the request text
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        request
    });

    (format!("http://{}/api", addr), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);

            if buf.len() >= pos + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

fn request_body(request: &str) -> Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_static_invocation_round_trip() {
    let (endpoint, server) = serve_once("200 OK", r#"{"id":1,"name":"ada"}"#).await;
    let invoker = HttpInvoker::new(endpoint).unwrap();

    let result = invoker
        .invoke_static("User.findById", vec![json!(1)])
        .await
        .unwrap();
    assert_eq!(result, json!({"id": 1, "name": "ada"}));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/User/findById HTTP/1.1"));
    assert_eq!(request_body(&request), json!({"args": [1]}));
}

#[tokio::test]
async fn test_instance_invocation_sends_identity() {
    let (endpoint, server) = serve_once("200 OK", r#"{"id":7,"name":"grace"}"#).await;
    let invoker = HttpInvoker::new(endpoint).unwrap();

    invoker
        .invoke_instance(
            "User.prototype.updateAttributes",
            json!(7),
            vec![json!({"name": "grace"})],
        )
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/User/prototype/updateAttributes HTTP/1.1"));
    assert_eq!(
        request_body(&request),
        json!({"id": 7, "args": [{"name": "grace"}]})
    );
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let (endpoint, server) = serve_once("204 No Content", "").await;
    let invoker = HttpInvoker::new(endpoint).unwrap();

    let result = invoker.invoke_static("User.deleteById", vec![json!(3)]).await;
    assert_eq!(result.unwrap(), Value::Null);
    server.await.unwrap();
}

#[tokio::test]
async fn test_not_found_error_is_classified() {
    let (endpoint, server) = serve_once(
        "404 Not Found",
        r#"{"error":{"name":"Error","message":"Unknown \"User\" id \"99\".","code":"MODEL_NOT_FOUND","statusCode":404}}"#,
    )
    .await;
    let invoker = HttpInvoker::new(endpoint).unwrap();

    let err = invoker
        .invoke_static("User.findById", vec![json!(99)])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.status, Some(404));
    server.await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_classified() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let invoker = HttpInvoker::new(format!("http://{}", addr)).unwrap();
    let err = invoker.invoke_static("User.count", vec![]).await.unwrap_err();
    assert_eq!(err.code.as_deref(), Some("ECONNREFUSED"));
}

#[tokio::test]
async fn test_timeout_is_classified() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept and hold the connection without answering
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(socket);
    });

    let invoker =
        HttpInvoker::with_timeout(format!("http://{}", addr), Duration::from_millis(200)).unwrap();
    let err = invoker.invoke_static("User.count", vec![]).await.unwrap_err();
    assert_eq!(err.code.as_deref(), Some("ETIMEDOUT"));

    server.abort();
}
