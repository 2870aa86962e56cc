use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use agentdeck_core::ledger::{ActivityEvent, ErrorEvent};
use agentdeck_core::model::ManualAddition;
use agentdeck_core::savings::SavingsBreakdown;
use agentdeck_core::uptime::{UptimeReport, UptimeView};
use agentdeck_core::{
    ActivityRequest, FleetConfig, SavingRequest, StatusRecord, StatusRegister, StatusReport,
};

use crate::error::{ApiJson, AppError};
use crate::state::AppState;

/// `?limit=N` on list endpoints. Anything that is not a positive integer
/// falls back to the endpoint default.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

impl LimitQuery {
    fn parse(&self) -> Option<usize> {
        self.limit.as_deref()?.trim().parse().ok()
    }
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub ok: bool,
    pub agent: StatusRecord,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub ok: bool,
    pub updated: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub ok: bool,
    pub cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub ok: bool,
    pub settings: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct SavingsResponse {
    pub ok: bool,
    pub addition: ManualAddition,
    pub total: f64,
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<FleetConfig> {
    Json(state.dashboard.read().await.config().clone())
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusRegister> {
    Json(state.dashboard.read().await.status().clone())
}

/// GET /api/status/{agent_id}
pub async fn get_agent_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<StatusRecord>, AppError> {
    state
        .dashboard
        .read()
        .await
        .agent_status(&agent_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Agent not found".to_string()))
}

/// POST /api/status/{agent_id}: an agent reports its current status.
pub async fn post_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ApiJson(report): ApiJson<StatusReport>,
) -> Result<Json<ReportResponse>, AppError> {
    let record = state
        .dashboard
        .write()
        .await
        .report_status(&agent_id, report)?;
    Ok(Json(ReportResponse {
        ok: true,
        agent: record,
    }))
}

/// POST /api/status: merge partial records for several agents at once.
pub async fn post_bulk_status(
    State(state): State<AppState>,
    ApiJson(updates): ApiJson<BTreeMap<String, Map<String, Value>>>,
) -> Json<BulkResponse> {
    let updated = state.dashboard.write().await.batch_update(updates);
    Json(BulkResponse { ok: true, updated })
}

/// GET /api/uptime
pub async fn get_uptime(State(state): State<AppState>) -> Json<UptimeReport> {
    Json(state.dashboard.write().await.uptime())
}

/// GET /api/uptime/{agent_id}
pub async fn get_agent_uptime(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Json<UptimeView> {
    Json(state.dashboard.write().await.uptime_for(&agent_id))
}

/// GET /api/errors?limit=N
pub async fn get_errors(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<ErrorEvent>> {
    Json(state.dashboard.read().await.errors(query.parse()))
}

/// DELETE /api/errors/{agent_id}
pub async fn clear_errors(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Json<ClearResponse> {
    let cleared = state.dashboard.write().await.clear_errors(&agent_id);
    Json(ClearResponse { ok: true, cleared })
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<Map<String, Value>> {
    Json(state.dashboard.read().await.settings().clone())
}

/// POST /api/settings: shallow merge into the stored settings.
pub async fn post_settings(
    State(state): State<AppState>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> Json<SettingsResponse> {
    let settings = state.dashboard.write().await.merge_settings(patch);
    Json(SettingsResponse { ok: true, settings })
}

/// GET /api/activity?limit=N
pub async fn get_activity(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<ActivityEvent>> {
    Json(state.dashboard.read().await.activity(query.parse()))
}

/// POST /api/activity: append a manual activity entry.
pub async fn post_activity(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ActivityRequest>,
) -> Result<(StatusCode, Json<ActivityEvent>), AppError> {
    let event = state.dashboard.write().await.post_activity(request)?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/savings
pub async fn get_savings(State(state): State<AppState>) -> Json<SavingsBreakdown> {
    Json(state.dashboard.read().await.savings())
}

/// POST /api/savings: record a manual savings addition.
pub async fn post_savings(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SavingRequest>,
) -> Result<Json<SavingsResponse>, AppError> {
    let update = state.dashboard.write().await.add_saving(request)?;
    Ok(Json(SavingsResponse {
        ok: true,
        addition: update.addition,
        total: update.total,
    }))
}
