use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::error::DashError;
use crate::filter::TaskFilter;
use crate::hub::{
    BroadcastHub, DEFAULT_SUBSCRIBER_BUFFER, ServerEvent, Snapshot, SubscriberId, Subscription,
};
use crate::ledger::{
    ACTIVITY_CAPACITY, ActivityEvent, ActivityLog, ERROR_CAPACITY, ErrorEvent, ErrorLedger,
    IdGenerator, icon_for,
};
use crate::model::{
    AgentStatus, FleetConfig, StatusRecord, StatusRegister, StatusReport, default_settings,
    non_empty,
};
use crate::savings::{self, SavingRequest, SavingsBreakdown, SavingsUpdate};
use crate::store::{Document, Store};
use crate::uptime::{UptimeLedger, UptimeReport, UptimeView, WorkingSince, elapsed_ms};

pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;
pub const DEFAULT_ERROR_LIMIT: usize = 20;

/// Entries included in a subscriber snapshot.
const SNAPSHOT_ACTIVITY: usize = 20;
const SNAPSHOT_ERRORS: usize = 10;

/// Tunables for a [`Dashboard`].
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub task_filter: TaskFilter,
    pub subscriber_buffer: usize,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            task_filter: TaskFilter::default(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Body of a manually posted activity entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityRequest {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// The dashboard core: sole owner of the status register, the ledgers, the
/// working-since markers, and the subscriber set.
///
/// Every operation runs to completion against `&mut self`, so callers that
/// serialize access (the server holds it behind one lock) get a single
/// total order of mutations, persistence writes, and broadcasts.
pub struct Dashboard {
    config: FleetConfig,
    status: StatusRegister,
    activity: ActivityLog,
    uptime: UptimeLedger,
    errors: ErrorLedger,
    settings: Map<String, Value>,
    working_since: WorkingSince,
    hub: BroadcastHub,
    ids: IdGenerator,
    task_filter: TaskFilter,
    clock: Arc<dyn Clock>,
    store: Arc<dyn Store>,
}

impl Dashboard {
    /// Load every document from `store`, falling back to defaults for any
    /// that are missing or unreadable.
    pub fn open(store: Arc<dyn Store>, clock: Arc<dyn Clock>, options: DashboardOptions) -> Self {
        let config: FleetConfig =
            load_document(store.as_ref(), Document::Config).unwrap_or_default();
        let status: StatusRegister =
            load_document(store.as_ref(), Document::Status).unwrap_or_default();
        let activity: Vec<ActivityEvent> =
            load_document(store.as_ref(), Document::Activity).unwrap_or_default();
        let uptime: UptimeLedger =
            load_document(store.as_ref(), Document::Uptime).unwrap_or_default();
        let errors: Vec<ErrorEvent> =
            load_document(store.as_ref(), Document::Errors).unwrap_or_default();
        let settings: Map<String, Value> =
            load_document(store.as_ref(), Document::Settings).unwrap_or_else(default_settings);

        tracing::info!(
            agents = config.agents.len(),
            departments = config.departments.len(),
            activity = activity.len(),
            errors = errors.len(),
            "Dashboard state loaded"
        );

        Self {
            config,
            status,
            activity: ActivityLog::from_events(activity, ACTIVITY_CAPACITY),
            uptime,
            errors: ErrorLedger::from_events(errors, ERROR_CAPACITY),
            settings,
            working_since: WorkingSince::default(),
            hub: BroadcastHub::new(options.subscriber_buffer),
            ids: IdGenerator::new(),
            task_filter: options.task_filter,
            clock,
            store,
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn status(&self) -> &StatusRegister {
        &self.status
    }

    pub fn agent_status(&self, agent_id: &str) -> Option<&StatusRecord> {
        self.status.agents.get(agent_id)
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    pub fn working_since(&self) -> &WorkingSince {
        &self.working_since
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.len()
    }

    /// Apply one agent's status report.
    ///
    /// Side effects run in a fixed order: uptime accrual, error ledger
    /// append (and `error` broadcast), record write, status persist,
    /// `status` broadcast, then at most one derived activity entry.
    pub fn report_status(
        &mut self,
        agent_id: &str,
        report: StatusReport,
    ) -> Result<StatusRecord, DashError> {
        if !self.config.has_agent(agent_id) {
            tracing::warn!(agent_id, "Status report for unknown agent rejected");
            return Err(DashError::UnknownAgent(agent_id.to_string()));
        }

        let now = self.clock.now();
        self.check_daily_reset();

        let previous = self.status.agents.get(agent_id).cloned();
        let prev_status = previous.as_ref().map(|r| r.status.clone());
        let prev_task = previous.and_then(|r| r.task);
        let was_working = prev_status.as_ref().is_some_and(AgentStatus::is_working);

        let record = report.into_record(now);
        let is_working = record.status.is_working();

        if is_working && !was_working {
            self.working_since.start(agent_id, now);
        } else if was_working
            && !is_working
            && let Some(since) = self.working_since.finish(agent_id)
        {
            let elapsed = elapsed_ms(since, now);
            self.uptime.accrue(agent_id, elapsed, now);
            self.persist(Document::Uptime, &self.uptime);
            tracing::debug!(agent_id, elapsed_ms = elapsed, "Working session closed");
        }

        if let Some(message) = record.error.clone() {
            let event = ErrorEvent {
                id: self.ids.next_id(now),
                timestamp: now,
                agent_id: agent_id.to_string(),
                error: message,
                task: record.task.clone().or_else(|| prev_task.clone()),
            };
            self.errors.push(event.clone());
            self.persist(Document::Errors, self.errors.entries());
            self.hub.broadcast(&ServerEvent::Error { data: event });
        }

        self.status
            .agents
            .insert(agent_id.to_string(), record.clone());
        self.status.last_updated = Some(now);
        self.persist(Document::Status, &self.status);
        self.hub.broadcast(&ServerEvent::Status {
            agent_id: agent_id.to_string(),
            data: record.clone(),
            prev_status,
        });

        if let Some((kind, text)) =
            derive_activity(&self.task_filter, &record, was_working, prev_task.as_deref())
        {
            self.append_activity(kind.to_string(), agent_id.to_string(), text, None, now);
        }

        tracing::info!(
            agent_id,
            status = %record.status,
            task = record.task.as_deref().unwrap_or("idle"),
            error = record.error.as_deref(),
            "Status reported"
        );
        Ok(record)
    }

    /// Shallow-merge partial records for known agents under one timestamp.
    ///
    /// Unknown agents are skipped. No uptime, error, or activity rules run.
    /// Fields with an unusable value are ignored per agent; the rest of the
    /// batch still applies. Returns the number of entries in the request.
    pub fn batch_update(&mut self, updates: BTreeMap<String, Map<String, Value>>) -> usize {
        let now = self.clock.now();

        let mut applied = 0;
        for (agent_id, patch) in &updates {
            if !self.config.has_agent(agent_id) {
                tracing::debug!(agent_id = %agent_id, "Skipping bulk update for unknown agent");
                continue;
            }
            let record = self
                .status
                .agents
                .entry(agent_id.clone())
                .or_insert_with(|| StatusReport::default().into_record(now));
            let ignored = record.apply_patch(patch);
            record.last_active = now;
            if !ignored.is_empty() {
                tracing::warn!(agent_id = %agent_id, ?ignored, "Ignoring malformed bulk fields");
            }
            applied += 1;
        }

        self.status.last_updated = Some(now);
        self.persist(Document::Status, &self.status);
        self.hub.broadcast(&ServerEvent::StatusBulk {
            data: self.status.clone(),
        });

        tracing::info!(requested = updates.len(), applied, "Bulk status update");
        updates.len()
    }

    /// Reset the uptime ledger if the UTC date changed since it was last
    /// touched. Returns true when a reset happened.
    pub fn check_daily_reset(&mut self) -> bool {
        let today = self.clock.today();
        if !self.uptime.roll_over(today) {
            return false;
        }
        tracing::info!(%today, "New day, resetting daily uptime");
        self.persist(Document::Uptime, &self.uptime);
        true
    }

    /// Whole uptime ledger with live sessions folded in.
    pub fn uptime(&mut self) -> UptimeReport {
        self.check_daily_reset();
        self.uptime.report(&self.working_since, self.clock.now())
    }

    pub fn uptime_for(&mut self, agent_id: &str) -> UptimeView {
        self.check_daily_reset();
        self.uptime
            .report_for(agent_id, &self.working_since, self.clock.now())
    }

    /// Newest-first activity slice. `None` or zero means the default of 20;
    /// the limit never exceeds the log capacity.
    pub fn activity(&self, limit: Option<usize>) -> Vec<ActivityEvent> {
        self.activity
            .recent(clamp_limit(limit, DEFAULT_ACTIVITY_LIMIT, ACTIVITY_CAPACITY))
    }

    pub fn post_activity(&mut self, request: ActivityRequest) -> Result<ActivityEvent, DashError> {
        let (Some(kind), Some(agent), Some(text)) = (
            non_empty(request.kind),
            non_empty(request.agent),
            non_empty(request.text),
        ) else {
            return Err(DashError::MalformedRequest(
                "Required: type, agent, text".to_string(),
            ));
        };
        let now = self.clock.now();
        Ok(self.append_activity(kind, agent, text, non_empty(request.icon), now))
    }

    /// Newest-first error slice, default 20, capped at 50.
    pub fn errors(&self, limit: Option<usize>) -> Vec<ErrorEvent> {
        self.errors
            .recent(clamp_limit(limit, DEFAULT_ERROR_LIMIT, ERROR_CAPACITY))
    }

    /// Drop every error reported by `agent_id` and clear the error field of
    /// its status record. Returns the number of ledger entries removed.
    pub fn clear_errors(&mut self, agent_id: &str) -> usize {
        let cleared = self.errors.clear_agent(agent_id);
        self.persist(Document::Errors, self.errors.entries());

        if let Some(record) = self.status.agents.get_mut(agent_id) {
            record.error = None;
            let data = record.clone();
            self.persist(Document::Status, &self.status);
            self.hub.broadcast(&ServerEvent::Status {
                agent_id: agent_id.to_string(),
                data,
                prev_status: None,
            });
        }

        tracing::info!(agent_id, cleared, "Errors cleared");
        cleared
    }

    /// Merge-overwrite settings. No validation beyond the merge.
    pub fn merge_settings(&mut self, patch: Map<String, Value>) -> Map<String, Value> {
        self.settings.extend(patch);
        self.persist(Document::Settings, &self.settings);
        self.hub.broadcast(&ServerEvent::Settings {
            data: self.settings.clone(),
        });
        self.settings.clone()
    }

    pub fn savings(&self) -> SavingsBreakdown {
        savings::breakdown(&self.config, self.clock.now())
    }

    /// Append a manual savings addition to the config, persist it, and
    /// broadcast the recomputed total.
    pub fn add_saving(&mut self, request: SavingRequest) -> Result<SavingsUpdate, DashError> {
        let now = self.clock.now();
        let today = now.date_naive().format("%Y-%m-%d").to_string();
        let addition = request.into_addition(&today)?;

        savings::append_addition(&mut self.config, addition.clone());
        self.persist(Document::Config, &self.config);

        let update = SavingsUpdate {
            total: savings::breakdown(&self.config, now).total,
            addition,
        };
        self.hub.broadcast(&ServerEvent::Savings {
            data: update.clone(),
        });
        tracing::info!(
            name = %update.addition.name,
            value = update.addition.value,
            total = update.total,
            "Savings addition recorded"
        );
        Ok(update)
    }

    /// Replace the config with one re-read from disk. Returns false (and
    /// broadcasts nothing) when it is unchanged.
    pub fn reload_config(&mut self, config: FleetConfig) -> bool {
        if config == self.config {
            return false;
        }
        self.config = config;
        self.hub.broadcast(&ServerEvent::Config {
            data: self.config.clone(),
        });
        tracing::info!(agents = self.config.agents.len(), "Config reloaded");
        true
    }

    /// Full state as sent to a newly connected subscriber.
    pub fn snapshot(&mut self) -> Snapshot {
        self.check_daily_reset();
        Snapshot {
            config: self.config.clone(),
            status: self.status.clone(),
            activity: self.activity.recent(SNAPSHOT_ACTIVITY),
            uptime: self.uptime.report(&self.working_since, self.clock.now()),
            errors: self.errors.recent(SNAPSHOT_ERRORS),
            settings: self.settings.clone(),
        }
    }

    /// Register a live-update subscriber. The snapshot is queued before the
    /// subscriber becomes visible to broadcasts.
    pub fn subscribe(&mut self) -> Subscription {
        let snapshot = self.snapshot();
        self.hub.subscribe(&ServerEvent::Init(Box::new(snapshot)))
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.hub.unsubscribe(id);
    }

    /// Broadcast the active working-since markers. Returns false when no
    /// agent is working and nothing was sent.
    pub fn heartbeat(&mut self) -> bool {
        if self.working_since.is_empty() {
            return false;
        }
        self.hub.broadcast(&ServerEvent::UptimeTick {
            working_since: self.working_since.to_map(),
        });
        true
    }

    fn append_activity(
        &mut self,
        kind: String,
        agent: String,
        text: String,
        icon: Option<String>,
        now: DateTime<Utc>,
    ) -> ActivityEvent {
        let icon = icon.unwrap_or_else(|| icon_for(&kind).to_string());
        let event = ActivityEvent {
            id: self.ids.next_id(now),
            timestamp: now,
            kind,
            agent,
            text,
            icon,
        };
        self.activity.push(event.clone());
        self.persist(Document::Activity, self.activity.entries());
        self.hub.broadcast(&ServerEvent::Activity {
            data: event.clone(),
        });
        event
    }

    /// Write-through to the store. Failures are logged and never undo the
    /// in-memory change.
    fn persist<T: Serialize + ?Sized>(&self, doc: Document, data: &T) {
        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%doc, error = %e, "Failed to serialize document");
                return;
            },
        };
        if let Err(e) = self.store.save(doc, &value) {
            tracing::warn!(%doc, error = %e, "Failed to persist document");
        }
    }
}

fn load_document<T: DeserializeOwned>(store: &dyn Store, doc: Document) -> Option<T> {
    match store.load(doc) {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(%doc, error = %e, "Document has unexpected shape, using default");
                None
            },
        },
        Ok(None) => {
            tracing::debug!(%doc, "No document found, using default");
            None
        },
        Err(e) => {
            tracing::warn!(%doc, error = %e, "Failed to load document, using default");
            None
        },
    }
}

fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.filter(|n| *n > 0).unwrap_or(default).min(max)
}

/// The single activity entry (type, text) a report produces, if any.
fn derive_activity(
    filter: &TaskFilter,
    record: &StatusRecord,
    was_working: bool,
    prev_task: Option<&str>,
) -> Option<(&'static str, String)> {
    if record.status.is_working()
        && !was_working
        && let Some(task) = record.task.as_deref()
        && !filter.is_system_task(Some(task))
    {
        return Some(("task", format!("Started: {task}")));
    }
    if matches!(record.status, AgentStatus::Complete | AgentStatus::Online)
        && was_working
        && let Some(task) = prev_task
        && !filter.is_system_task(Some(task))
    {
        return Some(("task", format!("Completed: {task}")));
    }
    record
        .error
        .as_deref()
        .map(|error| ("alert", format!("Error: {error}")))
}
