use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Accumulated working time of one agent for the current day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeEntry {
    #[serde(default)]
    pub total_ms: u64,
    #[serde(default)]
    pub sessions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session: Option<DateTime<Utc>>,
}

/// Per-day uptime ledger, persisted as `uptime.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeLedger {
    #[serde(default)]
    pub agents: BTreeMap<String, UptimeEntry>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl UptimeLedger {
    /// Reset the ledger when `today` differs from the stored date. Returns
    /// true when a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.date == Some(today) {
            return false;
        }
        self.agents.clear();
        self.date = Some(today);
        true
    }

    /// Close a working session of `elapsed_ms` that ended at `ended_at`.
    pub fn accrue(&mut self, agent_id: &str, elapsed_ms: u64, ended_at: DateTime<Utc>) {
        let entry = self.agents.entry(agent_id.to_string()).or_default();
        entry.total_ms = entry.total_ms.saturating_add(elapsed_ms);
        entry.sessions += 1;
        entry.last_session = Some(ended_at);
    }

    pub fn entry(&self, agent_id: &str) -> UptimeEntry {
        self.agents.get(agent_id).cloned().unwrap_or_default()
    }

    /// Ledger view with in-flight sessions folded in as `currentMs`.
    pub fn report(&self, working: &WorkingSince, now: DateTime<Utc>) -> UptimeReport {
        let mut agents: BTreeMap<String, UptimeView> = self
            .agents
            .iter()
            .map(|(id, entry)| (id.clone(), UptimeView::new(entry.clone(), None)))
            .collect();
        for (id, since) in working.iter() {
            agents
                .entry(id.clone())
                .or_insert_with(|| UptimeView::new(UptimeEntry::default(), None))
                .current_ms = Some(elapsed_ms(*since, now));
        }
        UptimeReport {
            agents,
            date: self.date,
        }
    }

    pub fn report_for(
        &self,
        agent_id: &str,
        working: &WorkingSince,
        now: DateTime<Utc>,
    ) -> UptimeView {
        let current = working.get(agent_id).map(|since| elapsed_ms(since, now));
        UptimeView::new(self.entry(agent_id), current)
    }
}

/// Uptime entry as returned to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeView {
    #[serde(flatten)]
    pub entry: UptimeEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ms: Option<u64>,
}

impl UptimeView {
    fn new(entry: UptimeEntry, current_ms: Option<u64>) -> Self {
        Self { entry, current_ms }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UptimeReport {
    pub agents: BTreeMap<String, UptimeView>,
    pub date: Option<NaiveDate>,
}

/// Milliseconds from `since` to `now`, clamped at zero.
pub fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - since).num_milliseconds()).unwrap_or(0)
}

/// In-memory markers for agents currently in a working interval. Never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSince {
    markers: BTreeMap<String, DateTime<Utc>>,
}

impl WorkingSince {
    pub fn start(&mut self, agent_id: &str, at: DateTime<Utc>) {
        self.markers.insert(agent_id.to_string(), at);
    }

    /// Remove and return the marker for `agent_id`.
    pub fn finish(&mut self, agent_id: &str) -> Option<DateTime<Utc>> {
        self.markers.remove(agent_id)
    }

    pub fn get(&self, agent_id: &str) -> Option<DateTime<Utc>> {
        self.markers.get(agent_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DateTime<Utc>)> {
        self.markers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn to_map(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.markers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn roll_over_resets_once_per_day() {
        let mut ledger = UptimeLedger::default();
        let day1 = t0().date_naive();
        assert!(ledger.roll_over(day1));
        ledger.accrue("mason", 1_000, t0());
        assert!(!ledger.roll_over(day1));
        assert_eq!(ledger.entry("mason").total_ms, 1_000);

        let day2 = day1.succ_opt().unwrap();
        assert!(ledger.roll_over(day2));
        assert!(ledger.agents.is_empty());
        assert_eq!(ledger.date, Some(day2));
        assert!(!ledger.roll_over(day2));
    }

    #[test]
    fn accrue_adds_time_and_counts_sessions() {
        let mut ledger = UptimeLedger::default();
        ledger.accrue("mason", 40_000, t0());
        ledger.accrue("mason", 2_000, t0() + TimeDelta::minutes(5));
        let entry = ledger.entry("mason");
        assert_eq!(entry.total_ms, 42_000);
        assert_eq!(entry.sessions, 2);
        assert_eq!(entry.last_session, Some(t0() + TimeDelta::minutes(5)));
    }

    #[test]
    fn report_folds_in_live_sessions_without_mutating() {
        let mut ledger = UptimeLedger::default();
        ledger.accrue("mason", 5_000, t0());
        let mut working = WorkingSince::default();
        working.start("mason", t0());
        working.start("surge", t0() + TimeDelta::seconds(10));

        let now = t0() + TimeDelta::seconds(30);
        let report = ledger.report(&working, now);
        assert_eq!(report.agents["mason"].current_ms, Some(30_000));
        assert_eq!(report.agents["mason"].entry.total_ms, 5_000);
        assert_eq!(report.agents["surge"].current_ms, Some(20_000));
        assert_eq!(report.agents["surge"].entry.sessions, 0);
        assert!(!ledger.agents.contains_key("surge"));

        let single = ledger.report_for("surge", &working, now);
        assert_eq!(single.current_ms, Some(20_000));
        let idle = ledger.report_for("quill", &working, now);
        assert_eq!(idle.current_ms, None);
        assert_eq!(idle.entry, UptimeEntry::default());
    }

    #[test]
    fn view_serializes_flat() {
        let view = UptimeView::new(
            UptimeEntry {
                total_ms: 10,
                sessions: 1,
                last_session: None,
            },
            Some(5),
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json, serde_json::json!({"totalMs": 10, "sessions": 1, "currentMs": 5}));
    }

    #[test]
    fn ledger_date_serializes_as_calendar_day() {
        let mut ledger = UptimeLedger::default();
        ledger.roll_over(t0().date_naive());
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["date"], "2026-03-01");
    }
}
