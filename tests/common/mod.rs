//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{request::Builder, Request},
    response::Response,
    Router,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use security_gate::config::GateConfig;
use security_gate::http::HttpServer;
use security_gate::security::ManualClock;

pub const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
pub const START_MS: u64 = 1_700_000_000_000;

/// A server whose gate runs on a manual clock.
pub fn test_server(config: GateConfig) -> (HttpServer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let server = HttpServer::with_clock(config, clock.clone()).unwrap();
    (server, clock)
}

/// Request builder carrying only a peer address.
pub fn bare_request(ip: [u8; 4], method: &str, uri: &str) -> Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from((ip, 40000))))
}

/// Request builder carrying a peer address and a browser user-agent.
pub fn request_from(ip: [u8; 4], method: &str, uri: &str) -> Builder {
    bare_request(ip, method, uri).header("user-agent", BROWSER)
}

pub fn get(ip: [u8; 4], uri: &str) -> Request<Body> {
    request_from(ip, "GET", uri).body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a mock backend that answers every request with a fixed body.
///
/// The backend echoes the request line back in `X-Seen-Request`.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let head = String::from_utf8_lossy(&buf[..n]).to_string();
                        let request_line = head.lines().next().unwrap_or_default().to_string();

                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nX-Seen-Request: {}\r\nServer: mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            request_line,
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
