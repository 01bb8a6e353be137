//! System state endpoints: liveness, fleet status, module detail, metrics

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::state::policy;
use crate::types::{ModuleState, ModuleStatus, SyncStatus, SystemCounters};

use super::ApiState;

// ============================================================================
// Liveness Endpoint
// ============================================================================

/// Liveness response. Every field has a zero/empty value before the first
/// cycle completes, never null.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    /// "operational" or "degraded", from the aggregate health score
    pub status: String,
    pub version: String,
    pub current_cycle: u64,
    pub uptime_seconds: u64,
    pub health_score: f64,
    pub module_count: usize,
    pub sync_pulses: u64,
    pub isolated_count: usize,
    /// RFC 3339 time of the last emitted heartbeat, empty if none yet
    pub last_heartbeat: String,
}

/// GET /health - Process liveness
pub async fn liveness(State(state): State<ApiState>) -> Json<LivenessResponse> {
    let snapshot = state.store.snapshot();
    let last_heartbeat = state
        .heartbeat
        .borrow()
        .as_ref()
        .map(|hb| hb.timestamp.to_rfc3339())
        .unwrap_or_default();

    let status = if snapshot.health_score >= policy::OPERATIONAL_HEALTH_THRESHOLD {
        "operational"
    } else {
        "degraded"
    };

    Json(LivenessResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        current_cycle: snapshot.master_cycle,
        uptime_seconds: snapshot.uptime_secs,
        health_score: snapshot.health_score,
        module_count: snapshot.modules.len(),
        sync_pulses: snapshot.counters.sync_pulses,
        isolated_count: snapshot.isolated.len(),
        last_heartbeat,
    })
}

// ============================================================================
// Status Endpoint
// ============================================================================

/// One module's row in the fleet status.
#[derive(Debug, Serialize)]
pub struct ModuleRow {
    pub name: String,
    pub is_critical: bool,
    pub state: ModuleState,
    pub health_score: f64,
    pub latency_ms: f64,
    pub sync_status: SyncStatus,
    pub cycle_number: u64,
    /// Seconds since the last successful health check, 0 if never
    pub last_heartbeat_age_secs: f64,
    pub consecutive_failures: u32,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub master_cycle: u64,
    pub health_score: f64,
    pub modules: Vec<ModuleRow>,
}

pub(crate) fn build_status_report(state: &ApiState) -> StatusReport {
    let snapshot = state.store.snapshot();
    let now = Utc::now();
    let modules = snapshot
        .modules
        .values()
        .map(|m| ModuleRow {
            name: m.name.clone(),
            is_critical: m.is_critical,
            state: m.state,
            health_score: m.health_score,
            latency_ms: m.latency_ms,
            sync_status: m.sync_status,
            cycle_number: m.cycle_number,
            last_heartbeat_age_secs: m.heartbeat_age_secs(now).unwrap_or(0.0),
            consecutive_failures: m.consecutive_failures,
        })
        .collect();

    StatusReport {
        master_cycle: snapshot.master_cycle,
        health_score: snapshot.health_score,
        modules,
    }
}

/// GET /api/v1/status - Every module's status row
pub async fn get_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(build_status_report(&state))
}

// ============================================================================
// Module Detail Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ModuleDetail {
    #[serde(flatten)]
    pub status: ModuleStatus,
    /// Drift from the current master cycle
    pub drift: u64,
}

/// GET /api/v1/modules/:name - Full status of one module
pub async fn get_module(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    let master_cycle = state.store.master_cycle();
    match state.store.module(&name) {
        Some(status) => {
            let drift = status.drift_from(master_cycle);
            ApiResponse::ok(ModuleDetail { status, drift })
        }
        None => ApiErrorResponse::unknown_module(&name),
    }
}

// ============================================================================
// Metrics Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: SystemCounters,
    pub master_cycle: u64,
    pub current_drift_level: u64,
    pub max_drift_observed: u64,
    pub health_score: f64,
    pub module_count: usize,
    pub uptime_seconds: u64,
}

/// GET /api/v1/metrics - Cumulative counters since process start
pub async fn get_metrics(State(state): State<ApiState>) -> Response {
    let snapshot = state.store.snapshot();
    ApiResponse::ok(MetricsResponse {
        counters: snapshot.counters,
        master_cycle: snapshot.master_cycle,
        current_drift_level: snapshot.current_drift_level,
        max_drift_observed: snapshot.max_drift_observed,
        health_score: snapshot.health_score,
        module_count: snapshot.modules.len(),
        uptime_seconds: snapshot.uptime_secs,
    })
}
