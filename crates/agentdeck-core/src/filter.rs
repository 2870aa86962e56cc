use serde::Deserialize;

/// Decides which task strings are housekeeping noise rather than real work.
///
/// Tasks classified as system tasks never produce `Started:`/`Completed:`
/// activity entries. A task is a system task when it is absent or empty,
/// equals one of `placeholders`, or contains one of `keywords`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskFilter {
    pub placeholders: Vec<String>,
    pub keywords: Vec<String>,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            placeholders: ["Available", "Idle", "Online", "task"]
                .into_iter()
                .map(String::from)
                .collect(),
            keywords: ["gateway", "clawdbot"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl TaskFilter {
    pub fn is_system_task(&self, task: Option<&str>) -> bool {
        let Some(task) = task else {
            return true;
        };
        task.is_empty()
            || self.placeholders.iter().any(|p| p == task)
            || self.keywords.iter().any(|k| task.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_matches_placeholders_and_keywords() {
        let filter = TaskFilter::default();
        assert!(filter.is_system_task(None));
        assert!(filter.is_system_task(Some("")));
        assert!(filter.is_system_task(Some("Idle")));
        assert!(filter.is_system_task(Some("Available")));
        assert!(filter.is_system_task(Some("restart gateway")));
        assert!(filter.is_system_task(Some("clawdbot heartbeat")));
        assert!(!filter.is_system_task(Some("Refactor cache layer")));
        // Placeholders match exactly, not by prefix.
        assert!(!filter.is_system_task(Some("Idle detection fix")));
    }

    #[test]
    fn filter_is_configurable() {
        let filter: TaskFilter =
            serde_json::from_str(r#"{"placeholders": ["Standby"], "keywords": ["cron"]}"#)
                .unwrap();
        assert!(filter.is_system_task(Some("Standby")));
        assert!(filter.is_system_task(Some("nightly cron run")));
        assert!(!filter.is_system_task(Some("Idle")));
    }

    #[test]
    fn missing_lists_fall_back_to_defaults() {
        let filter: TaskFilter = serde_json::from_str(r#"{"keywords": []}"#).unwrap();
        assert!(filter.is_system_task(Some("Online")));
        assert!(!filter.is_system_task(Some("gateway restart")));
    }
}
