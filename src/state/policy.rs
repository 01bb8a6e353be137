//! Autonomic policy: the fixed thresholds that turn raw health and drift
//! observations into state transitions.
//!
//! Kept free of locking and I/O so the transition table can be audited
//! and unit-tested on its own.

use crate::types::{ModuleState, SyncStatus};

/// Health at or above this is Operational.
pub const OPERATIONAL_HEALTH_THRESHOLD: f64 = 80.0;

/// Health at or above this (and below operational) is Degraded.
pub const DEGRADED_HEALTH_THRESHOLD: f64 = 50.0;

/// Health at or above this (and below degraded) is Isolated; below is Failed.
pub const ISOLATION_HEALTH_THRESHOLD: f64 = 20.0;

/// Consecutive failures at which a module is isolated.
pub const FAILURE_ISOLATION_THRESHOLD: u32 = 3;

/// Health points removed per recorded failure.
pub const FAILURE_HEALTH_PENALTY: f64 = 20.0;

/// Aggregate health points removed per isolated module.
pub const ISOLATION_AGGREGATE_PENALTY: f64 = 10.0;

/// Drift beyond `max_cycle_drift * SEVERE_DRIFT_MULTIPLIER` isolates a critical module.
pub const SEVERE_DRIFT_MULTIPLIER: u64 = 2;

pub const MIN_HEALTH: f64 = 0.0;
pub const MAX_HEALTH: f64 = 100.0;

/// Aggregate health reported when no modules are registered.
pub const EMPTY_FLEET_HEALTH: f64 = MAX_HEALTH;

/// Clamp a score into `[0, 100]`. NaN is treated as zero.
pub fn clamp_health(score: f64) -> f64 {
    if score.is_nan() {
        MIN_HEALTH
    } else {
        score.clamp(MIN_HEALTH, MAX_HEALTH)
    }
}

/// Fixed health-score to state mapping applied on every successful heartbeat.
pub fn state_for_health(score: f64) -> ModuleState {
    let score = clamp_health(score);
    if score >= OPERATIONAL_HEALTH_THRESHOLD {
        ModuleState::Operational
    } else if score >= DEGRADED_HEALTH_THRESHOLD {
        ModuleState::Degraded
    } else if score >= ISOLATION_HEALTH_THRESHOLD {
        ModuleState::Isolated
    } else {
        ModuleState::Failed
    }
}

/// Health after one failure penalty, floored at zero.
pub fn penalize_health(score: f64) -> f64 {
    clamp_health(score - FAILURE_HEALTH_PENALTY)
}

pub fn should_isolate_for_failures(consecutive_failures: u32) -> bool {
    consecutive_failures >= FAILURE_ISOLATION_THRESHOLD
}

/// Drift strictly beyond tolerance.
pub fn is_misaligned(drift: u64, max_cycle_drift: u64) -> bool {
    drift > max_cycle_drift
}

/// Drift strictly beyond twice the tolerance.
pub fn is_severe_drift(drift: u64, max_cycle_drift: u64) -> bool {
    drift > max_cycle_drift.saturating_mul(SEVERE_DRIFT_MULTIPLIER)
}

/// Sync status for an acknowledged cycle at `drift` from the reference.
///
/// An isolated module that comes back within tolerance is Realigning,
/// never InSync, until it is recovered.
pub fn sync_status_for_ack(drift: u64, max_cycle_drift: u64, state: ModuleState) -> SyncStatus {
    if is_misaligned(drift, max_cycle_drift) {
        SyncStatus::OutOfSync
    } else if state == ModuleState::Isolated {
        SyncStatus::Realigning
    } else {
        SyncStatus::InSync
    }
}

/// Mean of `scores`, minus the isolation penalty, clamped to `[0, 100]`.
pub fn aggregate_health<I>(scores: I, isolated_count: usize) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = scores
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), s| (sum + clamp_health(s), count + 1));

    if count == 0 {
        return EMPTY_FLEET_HEALTH;
    }

    let mean = sum / count as f64;
    clamp_health(mean - ISOLATION_AGGREGATE_PENALTY * isolated_count as f64)
}
