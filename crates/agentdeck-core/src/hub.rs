use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::ledger::{ActivityEvent, ErrorEvent};
use crate::model::{AgentStatus, FleetConfig, StatusRecord, StatusRegister};
use crate::savings::SavingsUpdate;
use crate::uptime::UptimeReport;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

pub type SubscriberId = u64;

/// Full state sent to a subscriber when it connects.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub config: FleetConfig,
    pub status: StatusRegister,
    pub activity: Vec<ActivityEvent>,
    pub uptime: UptimeReport,
    pub errors: Vec<ErrorEvent>,
    pub settings: Map<String, Value>,
}

/// Messages pushed over the live-update channel, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    Init(Box<Snapshot>),
    #[serde(rename_all = "camelCase")]
    Status {
        agent_id: String,
        data: StatusRecord,
        #[serde(skip_serializing_if = "Option::is_none")]
        prev_status: Option<AgentStatus>,
    },
    StatusBulk {
        data: StatusRegister,
    },
    Activity {
        data: ActivityEvent,
    },
    Error {
        data: ErrorEvent,
    },
    Settings {
        data: Map<String, Value>,
    },
    Config {
        data: FleetConfig,
    },
    Savings {
        data: SavingsUpdate,
    },
    #[serde(rename_all = "camelCase")]
    UptimeTick {
        working_since: BTreeMap<String, DateTime<Utc>>,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Status { .. } => "status",
            Self::StatusBulk { .. } => "status-bulk",
            Self::Activity { .. } => "activity",
            Self::Error { .. } => "error",
            Self::Settings { .. } => "settings",
            Self::Config { .. } => "config",
            Self::Savings { .. } => "savings",
            Self::UptimeTick { .. } => "uptime-tick",
        }
    }

    fn encode(&self) -> Option<Arc<str>> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Arc::from(json)),
            Err(e) => {
                tracing::warn!(kind = self.kind(), error = %e, "Failed to encode server event");
                None
            },
        }
    }
}

/// Receiving half handed to a connection handler. The first message is
/// always the `init` snapshot.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<Arc<str>>,
}

/// Set of live-update subscribers with non-blocking fan-out.
pub struct BroadcastHub {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<str>>>,
    next_id: SubscriberId,
    buffer: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            next_id: 1,
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber, enqueueing `snapshot` ahead of anything else
    /// it will receive.
    pub fn subscribe(&mut self, snapshot: &ServerEvent) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id;
        self.next_id += 1;
        if let Some(payload) = snapshot.encode()
            && let Err(e) = tx.try_send(payload)
        {
            tracing::debug!(subscriber = id, error = %e, "Failed to queue snapshot");
        }
        self.subscribers.insert(id, tx);
        tracing::info!(subscriber = id, total = self.subscribers.len(), "Subscriber connected");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            tracing::info!(
                subscriber = id,
                remaining = self.subscribers.len(),
                "Subscriber disconnected"
            );
        }
    }

    /// Deliver `event` to every subscriber without waiting. Closed
    /// subscribers are pruned; a full queue drops this event for that
    /// subscriber only.
    pub fn broadcast(&mut self, event: &ServerEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        let Some(payload) = event.encode() else {
            return;
        };
        self.subscribers
            .retain(|id, tx| match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = id, kind = event.kind(), "Subscriber lagging, event dropped");
                    true
                },
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = id, "Subscriber gone, pruning");
                    false
                },
            });
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
