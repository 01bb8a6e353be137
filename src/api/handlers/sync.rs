//! Synchronization endpoints: summary, module acknowledgments, forced sync

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::state::policy;

use super::ApiState;

/// GET /api/v1/sync - Counts by sync status, drift levels, last pulse
pub async fn get_sync(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.store.sync_summary())
}

// ============================================================================
// Module Acknowledgment
// ============================================================================

/// A module reporting its own cycle outside a beacon round.
#[derive(Debug, Deserialize)]
pub struct SyncAckRequest {
    pub module_name: String,
    pub cycle_number: u64,
    /// Module's own clock; informational only
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncAckResponse {
    pub aligned: bool,
    pub master_cycle: u64,
    pub drift: u64,
}

/// POST /api/v1/sync/ack - Record a module's reported cycle
pub async fn acknowledge_sync(
    State(state): State<ApiState>,
    payload: Result<Json<SyncAckRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let master_cycle = state.store.master_cycle();
    let max_cycle_drift = state.max_cycle_drift();
    let Some(drift) = state.store.record_sync_ack(
        &request.module_name,
        request.cycle_number,
        master_cycle,
        max_cycle_drift,
    ) else {
        return ApiErrorResponse::unknown_module(&request.module_name);
    };

    let aligned = !policy::is_misaligned(drift, max_cycle_drift);
    if aligned {
        debug!(module = %request.module_name, cycle = request.cycle_number, "[API] Sync ack aligned");
    } else {
        warn!(
            module = %request.module_name,
            cycle = request.cycle_number,
            master_cycle,
            drift,
            reported_at = ?request.timestamp,
            "[API] Sync ack out of tolerance"
        );
    }

    ApiResponse::ok(SyncAckResponse {
        aligned,
        master_cycle,
        drift,
    })
}

// ============================================================================
// Forced Sync
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ForceSyncRequest {
    /// Defaults to the current master cycle
    #[serde(default)]
    pub target_cycle: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ForceSyncResponse {
    pub target_cycle: u64,
    pub modules: usize,
}

/// POST /api/v1/sync/force - Snap every module to a target cycle
pub async fn force_sync(
    State(state): State<ApiState>,
    payload: Option<Json<ForceSyncRequest>>,
) -> Response {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let target_cycle = state.store.force_cycle_sync(request.target_cycle);
    ApiResponse::ok(ForceSyncResponse {
        target_cycle,
        modules: state.store.module_count(),
    })
}
