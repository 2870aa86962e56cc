use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub time: DateTime<Utc>,
    /// Agents in the current config.
    pub agents: usize,
    /// Live-update subscribers across WebSocket and SSE.
    pub connected: usize,
    pub version: &'static str,
    pub connections: ConnectionInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    pub sse: usize,
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ws = state.ws_connection_count.load(Ordering::Relaxed);
    let sse = state.sse_subscriber_count.load(Ordering::Relaxed);

    let (agents, connected) = {
        let dashboard = state.dashboard.read().await;
        (dashboard.config().agents.len(), dashboard.subscriber_count())
    };

    Json(HealthResponse {
        status: "ok",
        time: state.clock.now(),
        agents,
        connected,
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo { websocket: ws, sse },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agentdeck_core::test_helpers::{ManualClock, MemoryStore, sample_fleet, t0};

    use crate::config::ServerConfig;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            time: t0(),
            agents: 3,
            connected: 2,
            version: "0.1.0",
            connections: ConnectionInfo {
                websocket: 1,
                sse: 1,
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"ok\""));
        assert!(json.contains("\"agents\":3"));
        assert!(json.contains("\"websocket\":1"));
    }

    #[tokio::test]
    async fn health_counts_agents_and_subscribers() {
        let store = Arc::new(MemoryStore::with_config(sample_fleet()));
        let state = AppState::new(ServerConfig::default(), store, Arc::new(ManualClock::new(t0())));
        let _sub = state.dashboard.write().await.subscribe();

        let Json(resp) = health_check(State(state)).await;
        assert_eq!(resp.agents, 3);
        assert_eq!(resp.connected, 1);
        assert_eq!(resp.time, t0());
    }
}
