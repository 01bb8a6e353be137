//! Process-wide aggregates: counters, heartbeat, snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{ModuleStatus, SyncPulse};

/// Cumulative counters since process start. Never persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemCounters {
    pub heartbeats_sent: u64,
    pub sync_pulses: u64,
    pub monitoring_cycles: u64,
    pub failures_detected: u64,
    pub recoveries: u64,
}

/// Liveness pulse stamped by the heartbeat emitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Heartbeat {
    pub timestamp: DateTime<Utc>,
    pub cycle_number: u64,
    pub health_score: f64,
    pub module_count: usize,
    pub isolated_count: usize,
}

/// Point-in-time copy of the whole store, for reporting and alert derivation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSnapshot {
    pub taken_at: DateTime<Utc>,
    pub master_cycle: u64,
    pub modules: BTreeMap<String, ModuleStatus>,
    pub counters: SystemCounters,
    pub isolated: BTreeSet<String>,
    pub recovering: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub current_drift_level: u64,
    pub max_drift_observed: u64,
    pub last_pulse: Option<SyncPulse>,
    pub health_score: f64,
    pub uptime_secs: u64,
}
