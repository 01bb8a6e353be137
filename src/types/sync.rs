//! Synchronization types: SyncPulse, SyncBeacon, SyncAck, SyncSummary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of one completed beacon round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncPulse {
    pub timestamp: DateTime<Utc>,
    /// Master cycle after this round advanced it
    pub cycle_number: u64,
    pub modules_in_sync: usize,
    pub total_modules: usize,
    pub drift_detected: bool,
    pub max_drift: u64,
}

/// Payload broadcast to every module on a beacon round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncBeacon {
    /// The cycle this round will establish once it completes
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    pub system_health: f64,
    pub total_modules: usize,
    pub isolated_modules: usize,
}

/// A module's reply to a beacon.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncAck {
    /// Cycle the module reports being on; `None` if it did not say
    #[serde(default)]
    pub cycle_number: Option<u64>,
}

/// Counts by sync status plus cycle/drift context, for reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncSummary {
    pub current_cycle: u64,
    pub total_modules: usize,
    pub in_sync: usize,
    pub drifting: usize,
    pub out_of_sync: usize,
    pub realigning: usize,
    pub current_drift_level: u64,
    pub max_drift_observed: u64,
    pub last_pulse: Option<SyncPulse>,
}
