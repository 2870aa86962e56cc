use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum number of activity entries retained.
pub const ACTIVITY_CAPACITY: usize = 100;

/// Maximum number of error entries retained.
pub const ERROR_CAPACITY: usize = 50;

/// One line of the human-readable activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub agent: String,
    pub text: String,
    pub icon: String,
}

/// An error reported by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub error: String,
    #[serde(default)]
    pub task: Option<String>,
}

/// Default icon for an activity type.
pub fn icon_for(kind: &str) -> &'static str {
    match kind {
        "message" => "💬",
        "task" => "⚡",
        "commit" => "📝",
        "cron" => "⏰",
        "alert" => "🚨",
        "status" => "🔄",
        "system" => "🖥️",
        _ => "📌",
    }
}

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TIME_WIDTH: usize = 9;
const SEQ_WIDTH: usize = 3;
const SUFFIX_WIDTH: usize = 4;

fn base36(mut n: u64, width: usize) -> String {
    let mut buf = vec![b'0'; width];
    for slot in buf.iter_mut().rev() {
        *slot = BASE36[(n % 36) as usize];
        n /= 36;
    }
    // Only ASCII digits and lowercase letters are written.
    String::from_utf8(buf).unwrap_or_default()
}

/// Generates event ids: a fixed-width base36 millisecond prefix, a per-ms
/// sequence, and a random suffix. Ids compare in creation order even when
/// the clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last_ms: u64,
    seq: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        if ms > self.last_ms {
            self.last_ms = ms;
            self.seq = 0;
        } else {
            self.seq += 1;
            if self.seq >= 36u64.pow(SEQ_WIDTH as u32) {
                self.last_ms += 1;
                self.seq = 0;
            }
        }
        let suffix = rand::rng().random_range(0..36u64.pow(SUFFIX_WIDTH as u32));
        format!(
            "{}{}{}",
            base36(self.last_ms, TIME_WIDTH),
            base36(self.seq, SEQ_WIDTH),
            base36(suffix, SUFFIX_WIDTH)
        )
    }
}

/// Oldest-first activity feed with FIFO eviction.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    events: VecDeque<ActivityEvent>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(ACTIVITY_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    /// Restore a persisted log, keeping only the newest `capacity` entries.
    pub fn from_events(events: Vec<ActivityEvent>, capacity: usize) -> Self {
        let mut log = Self::with_capacity(capacity);
        for event in events {
            log.push(event);
        }
        log
    }

    pub fn push(&mut self, event: ActivityEvent) {
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEvent> {
        self.events.iter()
    }

    pub(crate) fn entries(&self) -> &VecDeque<ActivityEvent> {
        &self.events
    }
}

/// Newest-first error history with eviction of the oldest entries.
#[derive(Debug, Clone)]
pub struct ErrorLedger {
    events: VecDeque<ErrorEvent>,
    capacity: usize,
}

impl Default for ErrorLedger {
    fn default() -> Self {
        Self::with_capacity(ERROR_CAPACITY)
    }
}

impl ErrorLedger {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    /// Restore a persisted ledger (already newest-first).
    pub fn from_events(events: Vec<ErrorEvent>, capacity: usize) -> Self {
        let mut events: VecDeque<ErrorEvent> = events.into();
        events.truncate(capacity);
        Self { events, capacity }
    }

    pub fn push(&mut self, event: ErrorEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    /// Most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ErrorEvent> {
        self.events.iter().take(limit).cloned().collect()
    }

    /// Remove every entry reported by `agent_id`, returning how many were dropped.
    pub fn clear_agent(&mut self, agent_id: &str) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.agent_id != agent_id);
        before - self.events.len()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorEvent> {
        self.events.iter()
    }

    pub(crate) fn entries(&self) -> &VecDeque<ErrorEvent> {
        &self.events
    }
}
