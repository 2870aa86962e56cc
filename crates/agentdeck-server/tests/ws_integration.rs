#[allow(dead_code)]
mod common;

use std::time::Duration;

use futures::SinkExt;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use agentdeck_server::config::{ServerConfig, TimersConfig};
use common::{TestServer, report, ws_read_json, ws_read_until, ws_subscribe, ws_try_read_json};

#[tokio::test]
async fn first_frame_is_full_snapshot() {
    let server = TestServer::new().await;
    report(&server, "quill", json!({ "status": "idle" })).await;

    let (_ws, init) = ws_subscribe(&server.ws_url()).await;
    assert_eq!(init["config"]["agents"]["mason"]["name"], "Mason");
    assert_eq!(init["status"]["agents"]["quill"]["status"], "idle");
    assert!(init["activity"].is_array());
    assert!(init["errors"].is_array());
    assert!(init["uptime"]["agents"].is_object());
    assert!(init["settings"].is_object());
}

#[tokio::test]
async fn status_report_is_broadcast_with_activity() {
    let server = TestServer::new().await;
    let (mut ws, _) = ws_subscribe(&server.ws_url()).await;

    report(&server, "mason", json!({ "status": "working", "task": "Build API" })).await;

    let status = ws_read_json(&mut ws).await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["agentId"], "mason");
    assert_eq!(status["data"]["status"], "working");
    assert!(status.get("prevStatus").is_none());

    let activity = ws_read_until(&mut ws, "activity").await;
    assert_eq!(activity["data"]["text"], "Started: Build API");
    assert_eq!(activity["data"]["agent"], "mason");

    report(&server, "mason", json!({ "status": "complete" })).await;
    let status = ws_read_until(&mut ws, "status").await;
    assert_eq!(status["prevStatus"], "working");
    let activity = ws_read_until(&mut ws, "activity").await;
    assert_eq!(activity["data"]["text"], "Completed: Build API");
}

#[tokio::test]
async fn unknown_agent_broadcasts_nothing() {
    let server = TestServer::new().await;
    let (mut ws, _) = ws_subscribe(&server.ws_url()).await;

    let resp = report(&server, "ghost", json!({ "status": "working", "task": "x" })).await;
    assert_eq!(resp.status(), 404);
    assert!(
        ws_try_read_json(&mut ws, 300).await.is_none(),
        "rejected report must not reach subscribers"
    );
}

#[tokio::test]
async fn error_report_emits_error_event() {
    let server = TestServer::new().await;
    let (mut ws, _) = ws_subscribe(&server.ws_url()).await;

    report(
        &server,
        "surge",
        json!({ "status": "error", "task": "Deploy", "error": "timeout" }),
    )
    .await;

    let error = ws_read_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["agentId"], "surge");
    assert_eq!(error["data"]["error"], "timeout");
    assert_eq!(error["data"]["task"], "Deploy");
    let status = ws_read_json(&mut ws).await;
    assert_eq!(status["type"], "status");
}

#[tokio::test]
async fn every_client_receives_broadcasts() {
    let server = TestServer::new().await;
    let (mut a, _) = ws_subscribe(&server.ws_url()).await;
    let (mut b, _) = ws_subscribe(&server.ws_url()).await;

    reqwest::Client::new()
        .post(server.api_url("/settings"))
        .json(&json!({ "compactMode": true }))
        .send()
        .await
        .unwrap();

    for ws in [&mut a, &mut b] {
        let msg = ws_read_json(ws).await;
        assert_eq!(msg["type"], "settings");
        assert_eq!(msg["data"]["compactMode"], true);
    }
}

#[tokio::test]
async fn closed_client_is_unsubscribed() {
    let server = TestServer::new().await;
    let (mut a, _) = ws_subscribe(&server.ws_url()).await;
    let (mut b, _) = ws_subscribe(&server.ws_url()).await;
    assert_eq!(server.state.dashboard.read().await.subscriber_count(), 2);

    a.send(Message::Close(None)).await.unwrap();
    let mut remaining = 2;
    for _ in 0..50 {
        remaining = server.state.dashboard.read().await.subscriber_count();
        if remaining == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 1);

    report(&server, "quill", json!({ "status": "online" })).await;
    let msg: Value = ws_read_json(&mut b).await;
    assert_eq!(msg["type"], "status");
}

#[tokio::test]
async fn heartbeat_carries_working_markers() {
    let config = ServerConfig {
        timers: TimersConfig {
            heartbeat_secs: 1,
            ..TimersConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = TestServer::from_config(config).await;
    let (mut ws, _) = ws_subscribe(&server.ws_url()).await;

    report(&server, "mason", json!({ "status": "working", "task": "Index" })).await;
    let tick = ws_read_until(&mut ws, "uptime-tick").await;
    assert!(tick["workingSince"]["mason"].is_string());
    assert!(tick["workingSince"].get("surge").is_none());
}

#[tokio::test]
async fn ws_rejected_when_at_capacity() {
    use agentdeck_server::config::LimitsConfig;

    let config = ServerConfig {
        limits: LimitsConfig {
            max_ws_connections: 1,
            ..LimitsConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = TestServer::from_config(config).await;
    let (_first, _) = ws_subscribe(&server.ws_url()).await;

    let second = tokio_tungstenite::connect_async(server.ws_url()).await;
    assert!(second.is_err(), "second connection should be refused");
}
