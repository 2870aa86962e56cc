use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DashError;
use crate::model::{FleetConfig, ManualAddition, SavingsConfig};

/// Birth date used when `agents.json` carries none.
pub const DEFAULT_BIRTH_DATE: &str = "2026-01-25T23:53:22Z";

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSummary {
    pub hourly_rate: f64,
    pub active_ratio: f64,
}

/// Savings broken down into the time-based term and manual additions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsBreakdown {
    pub time_savings: f64,
    pub project_savings: f64,
    pub total: f64,
    pub projects: Vec<ManualAddition>,
    pub config: RateSummary,
}

/// Payload of the `savings` broadcast and the append response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsUpdate {
    pub total: f64,
    pub addition: ManualAddition,
}

/// Body of a manual savings addition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavingRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub date: Option<String>,
}

impl SavingRequest {
    /// Validate the request into an addition dated `today` unless a date
    /// was supplied. Numeric strings are accepted for `value`.
    pub fn into_addition(self, today: &str) -> Result<ManualAddition, DashError> {
        let name = self.name.filter(|n| !n.is_empty());
        let value = self.value.as_ref().and_then(numeric).filter(|v| *v != 0.0);
        let (Some(name), Some(value)) = (name, value) else {
            return Err(DashError::MalformedRequest(
                "name and value required".to_string(),
            ));
        };
        Ok(ManualAddition {
            name,
            value,
            date: self
                .date
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| today.to_string()),
        })
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn birth_date(config: &FleetConfig) -> DateTime<Utc> {
    config
        .meta
        .as_ref()
        .and_then(|m| m.birth_date.as_deref())
        .unwrap_or(DEFAULT_BIRTH_DATE)
        .parse::<DateTime<Utc>>()
        .or_else(|_| DEFAULT_BIRTH_DATE.parse::<DateTime<Utc>>())
        .unwrap_or_default()
}

fn savings_config(config: &FleetConfig) -> SavingsConfig {
    config
        .meta
        .as_ref()
        .and_then(|m| m.savings_config.clone())
        .unwrap_or_default()
}

/// `floor(hours since birth × hourly rate × active ratio)`, never negative.
pub fn time_savings(
    birth: DateTime<Utc>,
    hourly_rate: f64,
    active_ratio: f64,
    now: DateTime<Utc>,
) -> f64 {
    let hours = (now - birth).num_milliseconds() as f64 / MS_PER_HOUR;
    (hours * hourly_rate * active_ratio).floor().max(0.0)
}

pub fn breakdown(config: &FleetConfig, now: DateTime<Utc>) -> SavingsBreakdown {
    let savings = savings_config(config);
    let time = time_savings(
        birth_date(config),
        savings.hourly_rate,
        savings.active_ratio,
        now,
    );
    let manual: f64 = savings.manual_additions.iter().map(|a| a.value).sum();
    SavingsBreakdown {
        time_savings: time,
        project_savings: manual,
        total: time + manual,
        projects: savings.manual_additions,
        config: RateSummary {
            hourly_rate: savings.hourly_rate,
            active_ratio: savings.active_ratio,
        },
    }
}

/// Append `addition` to the config's savings section, creating it with
/// default rates when missing.
pub fn append_addition(config: &mut FleetConfig, addition: ManualAddition) {
    config
        .meta
        .get_or_insert_with(Default::default)
        .savings_config
        .get_or_insert_with(SavingsConfig::default)
        .manual_additions
        .push(addition);
}
