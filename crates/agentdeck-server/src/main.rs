use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use agentdeck_core::{Document, Store, SystemClock};
use agentdeck_server::config::ServerConfig;
use agentdeck_server::file_store::FileStore;
use agentdeck_server::{build_app, spawn_config_watcher, spawn_heartbeat};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("AGENTDECK_LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServerConfig::load();
    config.validate();

    let store = match FileStore::open(&config.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(dir = %config.data_dir, error = %e, "Cannot open data directory");
            std::process::exit(1);
        },
    };
    let config_path = store.path(Document::Config);
    let listen_addr = config.listen_addr.clone();

    let (app, state) = build_app(
        config,
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::new(SystemClock),
    );
    spawn_heartbeat(state.clone());
    spawn_config_watcher(state, config_path);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %listen_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        },
    };
    tracing::info!(
        addr = %listen_addr,
        data_dir = %store.dir().display(),
        "agentdeck server listening"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    store.flush().await;
    tracing::info!("agentdeck server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
