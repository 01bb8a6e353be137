//! Per-module types: ModuleState, SyncStatus, ModuleStatus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Module State
// ============================================================================

/// Operational state of a monitored module.
///
/// Transitions are driven by the autonomic policy:
/// operational -> degraded -> isolated -> recovering -> operational.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Registered but never checked
    #[default]
    Unknown,
    Operational,
    Degraded,
    /// Excluded from normal synchronization until recovered
    Isolated,
    Failed,
    Recovering,
}

impl ModuleState {
    /// Short code for logging
    pub fn short_code(&self) -> &'static str {
        match self {
            ModuleState::Unknown => "UNKNOWN",
            ModuleState::Operational => "OPERATIONAL",
            ModuleState::Degraded => "DEGRADED",
            ModuleState::Isolated => "ISOLATED",
            ModuleState::Failed => "FAILED",
            ModuleState::Recovering => "RECOVERING",
        }
    }

    /// True for states that count as a healthy, participating module.
    pub fn is_healthy(&self) -> bool {
        matches!(self, ModuleState::Operational)
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_code())
    }
}

// ============================================================================
// Synchronization Status
// ============================================================================

/// Where a module stands relative to the master cycle.
///
/// Tracked independently of [`ModuleState`]: a module may be Operational
/// and OutOfSync at the same time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InSync,
    Drifting,
    #[default]
    OutOfSync,
    /// Soft remediation; the next beacon round is expected to correct it
    Realigning,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::InSync => write!(f, "In Sync"),
            SyncStatus::Drifting => write!(f, "Drifting"),
            SyncStatus::OutOfSync => write!(f, "Out Of Sync"),
            SyncStatus::Realigning => write!(f, "Realigning"),
        }
    }
}

// ============================================================================
// Module Status
// ============================================================================

/// Everything the synchronizer knows about one registered module.
///
/// Only ever mutated through [`crate::state::SharedState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleStatus {
    /// Unique module name (registration key)
    pub name: String,
    /// Critical modules are isolated on severe cycle drift
    pub is_critical: bool,
    pub state: ModuleState,
    /// 0-100, decays on failure, recomputed on every successful check
    pub health_score: f64,
    /// Most recent health check round-trip time
    pub latency_ms: f64,
    pub sync_status: SyncStatus,
    /// Last cycle number the module acknowledged
    pub cycle_number: u64,
    pub consecutive_failures: u32,
    pub recovery_attempts: u32,
    pub last_error: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ModuleStatus {
    /// Fresh status for a newly registered module: Unknown, OutOfSync, cycle 0.
    pub fn new(name: impl Into<String>, is_critical: bool) -> Self {
        Self {
            name: name.into(),
            is_critical,
            state: ModuleState::Unknown,
            health_score: 100.0,
            latency_ms: 0.0,
            sync_status: SyncStatus::OutOfSync,
            cycle_number: 0,
            consecutive_failures: 0,
            recovery_attempts: 0,
            last_error: None,
            last_heartbeat: None,
        }
    }

    /// Seconds since the last successful heartbeat, if there has been one.
    pub fn heartbeat_age_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_heartbeat
            .map(|at| (now - at).num_milliseconds().max(0) as f64 / 1000.0)
    }

    /// Distance between this module's acknowledged cycle and `master_cycle`.
    pub fn drift_from(&self, master_cycle: u64) -> u64 {
        master_cycle.abs_diff(self.cycle_number)
    }
}
