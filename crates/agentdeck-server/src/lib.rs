pub mod api;
pub mod config;
pub mod error;
pub mod file_store;
pub mod health;
pub mod sse;
pub mod state;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{delete, get};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use agentdeck_core::{Clock, FleetConfig, Store};

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(
    config: ServerConfig,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
) -> (Router<()>, AppState) {
    let web_root = config.web_root.clone();
    let cors = cors_layer(&config.cors_origins);
    let state = AppState::new(config, store, clock);

    let api_routes = Router::new()
        .route("/config", get(api::get_config))
        .route("/status", get(api::get_status).post(api::post_bulk_status))
        .route(
            "/status/{agent_id}",
            get(api::get_agent_status).post(api::post_status),
        )
        .route("/uptime", get(api::get_uptime))
        .route("/uptime/{agent_id}", get(api::get_agent_uptime))
        .route("/errors", get(api::get_errors))
        .route("/errors/{agent_id}", delete(api::clear_errors))
        .route("/settings", get(api::get_settings).post(api::post_settings))
        .route("/activity", get(api::get_activity).post(api::post_activity))
        .route("/savings", get(api::get_savings).post(api::post_savings))
        .route("/health", get(health::health_check))
        .route("/events/stream", get(sse::event_stream));

    let mut app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api_routes);
    if let Some(root) = web_root {
        app = app.fallback_service(ServeDir::new(root));
    }

    let app = app
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
        ))
        .with_state(state.clone());

    (app, state)
}

/// CORS restricted to the configured origins. Entries that are not valid
/// header values (or `*`) are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            },
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Background task that broadcasts the working-since markers every
/// `timers.heartbeat_secs` while any agent is working.
pub fn spawn_heartbeat(state: AppState) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(state.config.timers.heartbeat_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let sent = state.dashboard.write().await.heartbeat();
            tracing::trace!(sent, "Heartbeat");
        }
    })
}

/// Background task that re-reads `path` whenever its modification time
/// changes and applies it as the new fleet config. A file that fails to
/// parse leaves the current config in place.
pub fn spawn_config_watcher(state: AppState, path: PathBuf) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(state.config.timers.config_poll_secs.max(1));
    tokio::spawn(async move {
        let mut last_seen = modified_at(&path).await;
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let current = modified_at(&path).await;
            if current.is_none() || current == last_seen {
                continue;
            }
            last_seen = current;

            match read_fleet_config(&path).await {
                Ok(config) => {
                    state.dashboard.write().await.reload_config(config);
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Config reload failed, keeping current config"
                    );
                },
            }
        }
    })
}

async fn modified_at(path: &std::path::Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn read_fleet_config(
    path: &std::path::Path,
) -> Result<FleetConfig, Box<dyn std::error::Error + Send + Sync>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layer_skips_wildcard_and_invalid_origins() {
        // AllowOrigin::list panics on `*`.
        let _layer = cors_layer(&[
            "*".to_string(),
            "http://localhost:3334".to_string(),
            "bad\norigin".to_string(),
        ]);
    }
}
