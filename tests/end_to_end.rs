//! End-to-end tests over real TCP connections.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use security_gate::config::{GateConfig, UpstreamConfig};
use security_gate::http::HttpServer;
use security_gate::lifecycle::Shutdown;

mod common;
use common::BROWSER;

async fn spawn_server(
    config: GateConfig,
) -> (String, Shutdown, mpsc::UnboundedSender<GateConfig>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_tx, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    (format!("http://{addr}"), shutdown, config_tx)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .user_agent(BROWSER)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_gate_over_tcp() {
    let (base, shutdown, _config_tx) = spawn_server(GateConfig::default()).await;
    let client = client();

    let res = client
        .get(format!("{base}/api/users/42"))
        .send()
        .await
        .expect("Gate unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    let echoed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(echoed["identity"], "127.0.0.1");

    // Scanner agents are refused but not blocklisted.
    let res = client
        .get(format!("{base}/"))
        .header("user-agent", "sqlmap/1.0")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    assert_eq!(client.get(format!("{base}/")).send().await.unwrap().status(), 200);

    // A malicious payload blocklists the client.
    let res = client
        .post(format!("{base}/comments"))
        .json(&serde_json::json!({"text": "'; DROP TABLE users; --"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(res.status(), 403);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], "IP_BLOCKED");

    shutdown.trigger();
}

#[tokio::test]
async fn test_forwarding_to_upstream() {
    let backend = common::start_mock_backend("upstream says hi").await;
    let mut config = GateConfig::default();
    config.upstream = Some(UpstreamConfig {
        address: backend.to_string(),
    });
    let (base, shutdown, _config_tx) = spawn_server(config).await;

    let res = client()
        .get(format!("{base}/search?q=%22quoted%22"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(!res.headers().contains_key("server"));
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");

    // The upstream receives the sanitized query.
    let seen = res.headers()["x-seen-request"].to_str().unwrap().to_string();
    assert!(seen.starts_with("GET /search?q=%26%2334%3Bquoted%26%2334%3B"), "{seen}");
    assert_eq!(res.text().await.unwrap(), "upstream says hi");

    shutdown.trigger();
}

#[tokio::test]
async fn test_hot_reload_over_channel() {
    let (base, shutdown, config_tx) = spawn_server(GateConfig::default()).await;
    let client = client();

    let mut config = GateConfig::default();
    config.rate_limit.max_requests = 1;
    config_tx.send(config).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(client.get(format!("{base}/a")).send().await.unwrap().status(), 200);
    let res = client.get(format!("{base}/a")).send().await.unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["x-ratelimit-limit"], "1");

    shutdown.trigger();
}
