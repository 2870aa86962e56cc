use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use agentdeck_core::{Clock, Dashboard, DashboardOptions, Store};

use crate::config::ServerConfig;

pub type SharedDashboard = Arc<RwLock<Dashboard>>;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: SharedDashboard,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let options = DashboardOptions {
            task_filter: config.activity.clone(),
            subscriber_buffer: config.limits.subscriber_buffer,
        };
        let dashboard = Dashboard::open(store, Arc::clone(&clock), options);
        Self {
            dashboard: Arc::new(RwLock::new(dashboard)),
            clock,
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Holds one slot of a connection counter for as long as it lives.
pub struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_tracks_live_connections() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = ConnectionGuard::new(Arc::clone(&counter));
        let b = ConnectionGuard::new(Arc::clone(&counter));
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        drop(a);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(b);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
