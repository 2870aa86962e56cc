use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reported status of an agent. Only `Working` drives uptime accounting;
/// statuses outside the known set are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Offline,
    #[default]
    Online,
    Working,
    Idle,
    Complete,
    Error,
    #[serde(untagged)]
    Other(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Working => "working",
            Self::Idle => "idle",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self, Self::Working)
    }
}

impl From<&str> for AgentStatus {
    /// Parse a wire status. An empty string means unset.
    fn from(s: &str) -> Self {
        match s {
            "" | "online" => Self::Online,
            "offline" => Self::Offline,
            "working" => Self::Working,
            "idle" => Self::Idle,
            "complete" => Self::Complete,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    pub last_active: DateTime<Utc>,
}

/// A single status report as posted by an agent. Every field is optional;
/// unset fields clear the corresponding field of the record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Builds the record this report produces at `now`. Empty strings are
    /// treated as absent.
    pub fn into_record(self, now: DateTime<Utc>) -> StatusRecord {
        StatusRecord {
            status: self
                .status
                .filter(|s| !s.as_str().is_empty())
                .unwrap_or_default(),
            task: non_empty(self.task),
            detail: non_empty(self.detail),
            progress: self.progress,
            error: non_empty(self.error),
            last_active: now,
        }
    }
}

impl StatusRecord {
    /// Shallow-merge loosely typed fields into the record. `null` clears an
    /// optional field and resets `status` to the default. Returns the keys
    /// left untouched because the key is unknown or the value has the wrong
    /// shape. `lastActive` is owned by the caller and skipped silently.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Vec<String> {
        let mut ignored = Vec::new();
        for (key, value) in patch {
            let applied = match key.as_str() {
                "status" => match value {
                    Value::Null => {
                        self.status = AgentStatus::default();
                        true
                    },
                    Value::String(s) => {
                        self.status = AgentStatus::from(s.as_str());
                        true
                    },
                    _ => false,
                },
                "task" => patch_text(&mut self.task, value),
                "detail" => patch_text(&mut self.detail, value),
                "error" => patch_text(&mut self.error, value),
                "progress" => match value {
                    Value::Null => {
                        self.progress = None;
                        true
                    },
                    Value::Number(n) => {
                        self.progress = n.as_f64();
                        true
                    },
                    Value::String(s) => match s.trim().parse::<f64>() {
                        Ok(p) if p.is_finite() => {
                            self.progress = Some(p);
                            true
                        },
                        _ => false,
                    },
                    _ => false,
                },
                "lastActive" => true,
                _ => false,
            };
            if !applied {
                ignored.push(key.clone());
            }
        }
        ignored
    }
}

fn patch_text(field: &mut Option<String>, value: &Value) -> bool {
    match value {
        Value::Null => {
            *field = None;
            true
        },
        Value::String(s) => {
            *field = non_empty(Some(s.clone()));
            true
        },
        _ => false,
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Agent id → current status record. Persisted as `status.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRegister {
    #[serde(default)]
    pub agents: BTreeMap<String, StatusRecord>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Fleet roster and department grouping, owned by `agents.json`.
///
/// Agent profiles and departments are opaque to the core; only the set of
/// agent ids and the savings section are interpreted. Unknown keys survive
/// a load/save round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub agents: BTreeMap<String, Value>,
    #[serde(default)]
    pub departments: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ConfigMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FleetConfig {
    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_config: Option<SavingsConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_hourly_rate() -> f64 {
    150.0
}

fn default_active_ratio() -> f64 {
    0.5
}

/// Parameters of the savings formula plus the manually entered addends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsConfig {
    #[serde(default = "default_hourly_rate")]
    pub hourly_rate: f64,
    #[serde(default = "default_active_ratio")]
    pub active_ratio: f64,
    #[serde(default)]
    pub manual_additions: Vec<ManualAddition>,
}

impl Default for SavingsConfig {
    fn default() -> Self {
        Self {
            hourly_rate: default_hourly_rate(),
            active_ratio: default_active_ratio(),
            manual_additions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualAddition {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub date: String,
}

/// Default user settings written when no `settings.json` exists.
pub fn default_settings() -> Map<String, Value> {
    let mut settings = Map::new();
    settings.insert("soundEnabled".into(), Value::Bool(true));
    settings.insert("soundVolume".into(), serde_json::json!(0.5));
    settings.insert("notificationsEnabled".into(), Value::Bool(true));
    settings.insert("showOfflineAgents".into(), Value::Bool(true));
    settings.insert("compactMode".into(), Value::Bool(false));
    settings
}
