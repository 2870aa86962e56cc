use serde::Deserialize;

use agentdeck_core::TaskFilter;
use agentdeck_core::hub::DEFAULT_SUBSCRIBER_BUFFER;

/// Config file read by [`ServerConfig::load`] when present.
pub const CONFIG_FILE: &str = "agentdeck.toml";

/// Top-level server configuration, loaded from `agentdeck.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Directory holding the JSON documents (`agents.json`, `status.json`, ...).
    pub data_dir: String,
    /// Static dashboard assets served as the router fallback.
    pub web_root: Option<String>,
    pub cors_origins: Vec<String>,
    pub limits: LimitsConfig,
    pub timers: TimersConfig,
    /// Which task strings count as housekeeping rather than work.
    pub activity: TaskFilter,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3334".to_string(),
            data_dir: "data".to_string(),
            web_root: None,
            cors_origins: vec![
                "http://localhost:3334".to_string(),
                "http://127.0.0.1:3334".to_string(),
            ],
            limits: LimitsConfig::default(),
            timers: TimersConfig::default(),
            activity: TaskFilter::default(),
        }
    }
}

/// Connection caps and queue sizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub max_sse_subscribers: usize,
    /// Per-subscriber queue depth; a subscriber this far behind misses events.
    pub subscriber_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            max_sse_subscribers: 100,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Background task periods.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    pub heartbeat_secs: u64,
    pub config_poll_secs: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            config_poll_secs: 2,
        }
    }
}

impl ServerConfig {
    /// Validate configuration, exiting on values the server cannot run with.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.data_dir.is_empty() {
            tracing::error!("data_dir must not be empty");
            std::process::exit(1);
        }

        if self.limits.max_ws_connections == 0 {
            tracing::error!("limits.max_ws_connections must be > 0");
            std::process::exit(1);
        }
        if self.limits.max_sse_subscribers == 0 {
            tracing::error!("limits.max_sse_subscribers must be > 0");
            std::process::exit(1);
        }
        if self.limits.subscriber_buffer == 0 {
            tracing::error!("limits.subscriber_buffer must be > 0");
            std::process::exit(1);
        }

        if self.timers.heartbeat_secs == 0 {
            tracing::error!("timers.heartbeat_secs must be > 0");
            std::process::exit(1);
        }
        if self.timers.config_poll_secs == 0 {
            tracing::error!("timers.config_poll_secs must be > 0");
            std::process::exit(1);
        }

        if self.cors_origins.iter().any(|o| o == "*") {
            tracing::warn!("cors_origins contains '*', which is ignored; list origins explicitly");
        }
    }

    /// Load config from `agentdeck.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string(CONFIG_FILE) {
            Ok(content) => Self::parse(&content),
            Err(_) => {
                tracing::info!("No {CONFIG_FILE} found, using defaults");
                ServerConfig::default()
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn parse(content: &str) -> Self {
        match toml::from_str::<ServerConfig>(content) {
            Ok(cfg) => {
                tracing::info!("Loaded configuration from {CONFIG_FILE}");
                cfg
            },
            Err(e) => {
                tracing::warn!("Failed to parse {CONFIG_FILE}: {e}, using defaults");
                ServerConfig::default()
            },
        }
    }

    /// Apply `AGENTDECK_*` overrides. Empty or unparsable values are ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("AGENTDECK_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Some(dir) = var("AGENTDECK_DATA_DIR")
            && !dir.is_empty()
        {
            self.data_dir = dir;
        }
        if let Some(root) = var("AGENTDECK_WEB_ROOT")
            && !root.is_empty()
        {
            self.web_root = Some(root);
        }
        if let Some(val) = var("AGENTDECK_HEARTBEAT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.timers.heartbeat_secs = n;
        }

        // Limits overrides
        if let Some(val) = var("AGENTDECK_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
        if let Some(val) = var("AGENTDECK_MAX_SSE_SUBSCRIBERS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_sse_subscribers = n;
        }
    }
}
