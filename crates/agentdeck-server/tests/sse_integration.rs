#[allow(dead_code)]
mod common;

use std::time::Duration;

use serde_json::json;

use common::{TestServer, report};

#[tokio::test]
async fn sse_streams_snapshot_then_events() {
    let server = TestServer::new().await;
    let sse_url = server.api_url("/events/stream");

    let client = reqwest::Client::new();
    let mut resp = client.get(&sse_url).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let mut collected = String::new();
    let saw_init = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match resp.chunk().await {
                Ok(Some(bytes)) => {
                    collected.push_str(&String::from_utf8_lossy(&bytes));
                    if collected.contains("\"type\":\"init\"") {
                        return true;
                    }
                },
                _ => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(saw_init, "SSE stream should open with the snapshot, got: {collected}");

    report(&server, "surge", json!({ "status": "working", "task": "Release" })).await;

    let saw_status = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match resp.chunk().await {
                Ok(Some(bytes)) => {
                    collected.push_str(&String::from_utf8_lossy(&bytes));
                    if collected.contains("\"agentId\":\"surge\"") {
                        return true;
                    }
                },
                _ => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(saw_status, "SSE stream should carry the status event, got: {collected}");

    let init_at = collected.find("\"type\":\"init\"").unwrap();
    let status_at = collected.find("\"type\":\"status\"").unwrap();
    assert!(init_at < status_at);
}

#[tokio::test]
async fn sse_returns_503_when_at_capacity() {
    use agentdeck_server::config::{LimitsConfig, ServerConfig};

    let config = ServerConfig {
        limits: LimitsConfig {
            max_sse_subscribers: 1,
            ..LimitsConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = TestServer::from_config(config).await;
    let client = reqwest::Client::new();
    let sse_url = server.api_url("/events/stream");

    let resp1 = client.get(&sse_url).send().await.unwrap();
    assert_eq!(resp1.status(), 200);

    // Give it a moment to register
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resp2 = client.get(&sse_url).send().await.unwrap();
    assert_eq!(
        resp2.status(),
        503,
        "Should reject when SSE subscriber limit reached"
    );
    drop(resp1);
}
