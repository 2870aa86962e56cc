use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use agentdeck_core::test_helpers::sample_fleet;
use agentdeck_core::{Document, Store, SystemClock};
use agentdeck_server::config::ServerConfig;
use agentdeck_server::file_store::FileStore;
use agentdeck_server::state::AppState;
use agentdeck_server::{build_app, spawn_config_watcher, spawn_heartbeat};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: Arc<FileStore>,
    pub data_dir: TempDir,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server over a fresh data dir seeded with the sample fleet.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            data_dir.path().join(Document::Config.file_name()),
            serde_json::to_vec_pretty(&sample_fleet()).unwrap(),
        )
        .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let store = Arc::new(FileStore::open(data_dir.path()).unwrap());
        let config_path = store.path(Document::Config);
        let (app, state) = build_app(
            config,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(SystemClock),
        );
        spawn_heartbeat(state.clone());
        spawn_config_watcher(state.clone(), config_path);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            store,
            data_dir,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}/api{path}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn data_path(&self, doc: Document) -> PathBuf {
        self.data_dir.path().join(doc.file_name())
    }

    /// Read a persisted document once every queued write has landed.
    pub async fn persisted(&self, doc: Document) -> Value {
        self.store.flush().await;
        let raw = std::fs::read_to_string(self.data_path(doc)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Read the next JSON text frame (5s timeout).
pub async fn ws_read_json(stream: &mut WsStream) -> Value {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Try to read a JSON text frame, returning None on timeout.
pub async fn ws_try_read_json(stream: &mut WsStream, timeout_ms: u64) -> Option<Value> {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Read frames until one of type `kind` arrives, returning it.
pub async fn ws_read_until(stream: &mut WsStream, kind: &str) -> Value {
    loop {
        let msg = ws_read_json(stream).await;
        if msg["type"] == kind {
            return msg;
        }
    }
}

/// Connect and consume the `init` snapshot.
pub async fn ws_subscribe(url: &str) -> (WsStream, Value) {
    let mut stream = ws_connect(url).await;
    let init = ws_read_json(&mut stream).await;
    assert_eq!(init["type"], "init", "first frame must be the snapshot");
    (stream, init)
}

/// POST a status report for `agent`.
pub async fn report(server: &TestServer, agent: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(server.api_url(&format!("/status/{agent}")))
        .json(&body)
        .send()
        .await
        .unwrap()
}
