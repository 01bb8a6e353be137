//! Administrative endpoints: manual isolation, recovery, alerts

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alerts::derive_alerts;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::{Alert, ModuleState};

use super::ApiState;

const DEFAULT_ISOLATION_REASON: &str = "manual isolation";

#[derive(Debug, Default, Deserialize)]
pub struct IsolateRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModuleActionResponse {
    pub module: String,
    pub state: ModuleState,
    /// False when the module was already in the requested condition
    pub changed: bool,
}

/// POST /api/v1/modules/:name/isolate - Isolate a module by hand
pub async fn isolate_module(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    payload: Option<Json<IsolateRequest>>,
) -> Response {
    let reason = payload
        .and_then(|Json(r)| r.reason)
        .unwrap_or_else(|| DEFAULT_ISOLATION_REASON.to_string());

    match state.store.isolate_module(&name, &reason) {
        Some(changed) => {
            info!(module = %name, reason = %reason, "[API] Manual isolation requested");
            ApiResponse::ok(ModuleActionResponse {
                module: name,
                state: ModuleState::Isolated,
                changed,
            })
        }
        None => ApiErrorResponse::unknown_module(&name),
    }
}

/// POST /api/v1/modules/:name/recover - Begin recovery of a module
pub async fn recover_module(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.store.begin_recovery(&name) {
        Some(true) => {
            info!(module = %name, "[API] Manual recovery requested");
            ApiResponse::ok(ModuleActionResponse {
                module: name,
                state: ModuleState::Recovering,
                changed: true,
            })
        }
        Some(false) => {
            let current = state
                .store
                .module(&name)
                .map(|m| m.state)
                .unwrap_or_default();
            ApiErrorResponse::conflict(format!(
                "Module {name} is {current}; only isolated, failed or degraded modules can be recovered"
            ))
        }
        None => ApiErrorResponse::unknown_module(&name),
    }
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub count: usize,
    pub alerts: Vec<Alert>,
}

/// GET /api/v1/alerts - Active alerts, most severe first
pub async fn get_alerts(State(state): State<ApiState>) -> Response {
    let alerts = derive_alerts(&state.store.snapshot(), &state.thresholds);
    ApiResponse::ok(AlertsResponse {
        count: alerts.len(),
        alerts,
    })
}
