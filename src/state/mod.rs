//! Shared State Store
//!
//! Process-wide record of every monitored module, the master cycle counter,
//! drift levels and aggregate counters. Owned by the composition root and
//! handed to each background loop as `Arc<SharedState>`.
//!
//! A single mutex guards everything, so a failure-counter increment and the
//! isolation decision it triggers always happen together. Mutations are
//! total: unknown module names are no-ops, never errors.

pub mod policy;

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::types::{
    Heartbeat, ModuleState, ModuleStatus, SyncPulse, SyncStatus, SyncSummary, SystemCounters,
    SystemSnapshot,
};

#[derive(Debug, Default)]
struct StoreInner {
    modules: BTreeMap<String, ModuleStatus>,
    master_cycle: u64,
    counters: SystemCounters,
    /// Names whose state is Isolated
    isolated: BTreeSet<String>,
    /// Names whose state is Recovering
    recovering: BTreeSet<String>,
    /// Names whose state is Failed
    failed: BTreeSet<String>,
    current_drift_level: u64,
    max_drift_observed: u64,
    last_pulse: Option<SyncPulse>,
}

impl StoreInner {
    fn health_score(&self) -> f64 {
        policy::aggregate_health(
            self.modules.values().map(|m| m.health_score),
            self.isolated.len(),
        )
    }

    /// Move `name` to `to`, keeping the isolated/failed/recovering sets in
    /// step with module state. Returns the previous state.
    fn transition(&mut self, name: &str, to: ModuleState) -> Option<ModuleState> {
        let status = self.modules.get_mut(name)?;
        let from = status.state;
        if from == to {
            return Some(from);
        }

        status.state = to;
        if to == ModuleState::Isolated && status.sync_status != SyncStatus::Realigning {
            status.sync_status = SyncStatus::OutOfSync;
        }

        self.isolated.remove(name);
        self.failed.remove(name);
        self.recovering.remove(name);

        match to {
            ModuleState::Operational => {
                if from != ModuleState::Unknown {
                    self.counters.recoveries += 1;
                    info!(module = name, from = %from, "Module recovered to OPERATIONAL");
                } else {
                    info!(module = name, "Module OPERATIONAL");
                }
            }
            ModuleState::Degraded => {
                warn!(module = name, from = %from, "Module DEGRADED");
            }
            ModuleState::Isolated => {
                self.isolated.insert(name.to_string());
                error!(module = name, from = %from, "Module ISOLATED");
            }
            ModuleState::Failed => {
                self.failed.insert(name.to_string());
                error!(module = name, from = %from, "Module FAILED");
            }
            ModuleState::Recovering => {
                self.recovering.insert(name.to_string());
                info!(module = name, from = %from, "Module RECOVERING");
            }
            ModuleState::Unknown => {}
        }

        Some(from)
    }
}

/// The synchronizer's single piece of shared mutable state.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<StoreInner>,
    started_at: Instant,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            started_at: Instant::now(),
        }
    }

    /// A panic while holding the lock must not wedge every loop, so poisoning
    /// is ignored; every mutation leaves the inner state consistent.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `name` if unknown. Returns `true` if a new status was created.
    ///
    /// An existing status is left untouched.
    pub fn initialize_module(&self, name: &str, is_critical: bool) -> bool {
        let mut inner = self.lock();
        if inner.modules.contains_key(name) {
            return false;
        }
        inner
            .modules
            .insert(name.to_string(), ModuleStatus::new(name, is_critical));
        debug!(module = name, is_critical, "Module registered");
        true
    }

    /// Idempotently register every `(name, is_critical)` pair. Returns how
    /// many were newly created.
    pub fn ensure_modules<'a, I>(&self, modules: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut inner = self.lock();
        let mut created = 0;
        for (name, is_critical) in modules {
            if !inner.modules.contains_key(name) {
                inner
                    .modules
                    .insert(name.to_string(), ModuleStatus::new(name, is_critical));
                created += 1;
            }
        }
        created
    }

    // ========================================================================
    // Health Mutations
    // ========================================================================

    /// Record a successful health check.
    ///
    /// Resets the consecutive-failure counter and derives state from
    /// `health_score`. Returns the module's new state.
    pub fn record_heartbeat(
        &self,
        name: &str,
        latency: Duration,
        health_score: f64,
    ) -> Option<ModuleState> {
        let mut inner = self.lock();
        let status = inner.modules.get_mut(name)?;

        let score = policy::clamp_health(health_score);
        status.latency_ms = latency.as_secs_f64() * 1000.0;
        status.health_score = score;
        status.last_heartbeat = Some(Utc::now());
        status.consecutive_failures = 0;

        let to = policy::state_for_health(score);
        inner.transition(name, to);
        Some(to)
    }

    /// Record a failed health check or beacon send.
    ///
    /// Isolates the module once the consecutive-failure counter reaches
    /// [`policy::FAILURE_ISOLATION_THRESHOLD`]; otherwise it is Degraded.
    /// Returns the updated consecutive-failure count.
    pub fn record_failure(&self, name: &str, error_text: &str) -> Option<u32> {
        let mut inner = self.lock();
        let status = inner.modules.get_mut(name)?;

        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.health_score = policy::penalize_health(status.health_score);
        status.last_error = Some(error_text.to_string());

        let failures = status.consecutive_failures;
        let to = if policy::should_isolate_for_failures(failures) {
            ModuleState::Isolated
        } else if matches!(status.state, ModuleState::Isolated | ModuleState::Failed) {
            // A single failure never improves a module's standing.
            status.state
        } else {
            ModuleState::Degraded
        };

        inner.counters.failures_detected += 1;
        warn!(
            module = name,
            consecutive_failures = failures,
            error = error_text,
            "Module failure recorded"
        );
        inner.transition(name, to);
        Some(failures)
    }

    /// Monitor post-pass: couple a finished health check to sync status.
    ///
    /// A successful check on an Operational module marks it InSync; an
    /// unsuccessful one on a Degraded or Failed module marks it OutOfSync.
    /// Isolated modules are never promoted to InSync here.
    pub fn apply_health_sync(&self, name: &str, check_succeeded: bool) -> Option<SyncStatus> {
        let mut inner = self.lock();
        let status = inner.modules.get_mut(name)?;

        if check_succeeded && status.state.is_healthy() {
            if status.sync_status != SyncStatus::InSync {
                debug!(module = name, from = %status.sync_status, "Healthy module marked in sync");
                status.sync_status = SyncStatus::InSync;
            }
        } else if !check_succeeded
            && matches!(status.state, ModuleState::Degraded | ModuleState::Failed)
        {
            status.sync_status = SyncStatus::OutOfSync;
        }

        Some(status.sync_status)
    }

    // ========================================================================
    // Synchronization Mutations
    // ========================================================================

    /// Complete a beacon round: advance the master cycle by exactly one and
    /// retain the pulse. Returns the new master cycle.
    pub fn record_sync_pulse(
        &self,
        modules_in_sync: usize,
        total_modules: usize,
        drift_detected: bool,
        max_drift: u64,
    ) -> u64 {
        let mut inner = self.lock();
        inner.master_cycle = inner.master_cycle.saturating_add(1);
        inner.counters.sync_pulses += 1;

        if drift_detected {
            inner.current_drift_level = inner.current_drift_level.max(max_drift);
            inner.max_drift_observed = inner.max_drift_observed.max(max_drift);
        }

        let cycle = inner.master_cycle;
        inner.last_pulse = Some(SyncPulse {
            timestamp: Utc::now(),
            cycle_number: cycle,
            modules_in_sync,
            total_modules,
            drift_detected,
            max_drift,
        });
        cycle
    }

    /// Record a module's acknowledged cycle, classifying it against
    /// `reference_cycle`. Returns the drift.
    pub fn record_sync_ack(
        &self,
        name: &str,
        reported_cycle: u64,
        reference_cycle: u64,
        max_cycle_drift: u64,
    ) -> Option<u64> {
        let mut inner = self.lock();
        let status = inner.modules.get_mut(name)?;

        let drift = reference_cycle.abs_diff(reported_cycle);
        status.cycle_number = reported_cycle;
        status.sync_status = policy::sync_status_for_ack(drift, max_cycle_drift, status.state);
        Some(drift)
    }

    pub fn mark_out_of_sync(&self, name: &str) -> bool {
        self.set_sync_status(name, SyncStatus::OutOfSync)
    }

    pub fn mark_realigning(&self, name: &str) -> bool {
        self.set_sync_status(name, SyncStatus::Realigning)
    }

    fn set_sync_status(&self, name: &str, sync_status: SyncStatus) -> bool {
        let mut inner = self.lock();
        match inner.modules.get_mut(name) {
            Some(status) => {
                status.sync_status = sync_status;
                true
            }
            None => false,
        }
    }

    /// Overwrite the current drift level. The maximum is only ever raised.
    pub fn set_drift_level(&self, level: u64) {
        let mut inner = self.lock();
        inner.current_drift_level = level;
        inner.max_drift_observed = inner.max_drift_observed.max(level);
    }

    /// Snap every module's cycle to `target` (default: the master cycle),
    /// mark all InSync and reset the drift level. Returns the target used.
    ///
    /// Administrative override; the master cycle itself is not moved.
    pub fn force_cycle_sync(&self, target: Option<u64>) -> u64 {
        let mut inner = self.lock();
        let target = target.unwrap_or(inner.master_cycle);
        for status in inner.modules.values_mut() {
            status.cycle_number = target;
            status.sync_status = SyncStatus::InSync;
        }
        inner.current_drift_level = 0;
        warn!(
            target_cycle = target,
            modules = inner.modules.len(),
            "Forced cycle sync applied"
        );
        target
    }

    // ========================================================================
    // Isolation & Recovery
    // ========================================================================

    /// Isolate `name` for `reason`. Returns `Some(true)` if it was not
    /// already isolated.
    pub fn isolate_module(&self, name: &str, reason: &str) -> Option<bool> {
        let mut inner = self.lock();
        let status = inner.modules.get_mut(name)?;
        if status.state == ModuleState::Isolated {
            return Some(false);
        }
        status.last_error = Some(reason.to_string());
        status.sync_status = SyncStatus::OutOfSync;

        inner.transition(name, ModuleState::Isolated)?;
        error!(module = name, reason, "Isolation applied");
        Some(true)
    }

    /// Begin recovery of an Isolated, Failed or Degraded module.
    ///
    /// Returns `Some(true)` if recovery started, `Some(false)` if the
    /// module's state does not call for it.
    pub fn begin_recovery(&self, name: &str) -> Option<bool> {
        let mut inner = self.lock();
        let status = inner.modules.get_mut(name)?;

        if !matches!(
            status.state,
            ModuleState::Isolated | ModuleState::Failed | ModuleState::Degraded
        ) {
            return Some(false);
        }

        status.recovery_attempts = status.recovery_attempts.saturating_add(1);
        status.consecutive_failures = 0;
        status.sync_status = SyncStatus::Realigning;
        let attempts = status.recovery_attempts;

        inner.transition(name, ModuleState::Recovering);
        info!(module = name, attempts, "Recovery started");
        Some(true)
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Count a liveness pulse and stamp it with the current aggregates.
    pub fn note_heartbeat_sent(&self) -> Heartbeat {
        let mut inner = self.lock();
        inner.counters.heartbeats_sent += 1;
        Heartbeat {
            timestamp: Utc::now(),
            cycle_number: inner.master_cycle,
            health_score: inner.health_score(),
            module_count: inner.modules.len(),
            isolated_count: inner.isolated.len(),
        }
    }

    pub fn note_monitoring_cycle(&self) -> u64 {
        let mut inner = self.lock();
        inner.counters.monitoring_cycles += 1;
        inner.counters.monitoring_cycles
    }

    // ========================================================================
    // Read Accessors
    // ========================================================================

    pub fn module(&self, name: &str) -> Option<ModuleStatus> {
        self.lock().modules.get(name).cloned()
    }

    pub fn modules(&self) -> BTreeMap<String, ModuleStatus> {
        self.lock().modules.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().modules.contains_key(name)
    }

    pub fn module_count(&self) -> usize {
        self.lock().modules.len()
    }

    pub fn master_cycle(&self) -> u64 {
        self.lock().master_cycle
    }

    pub fn counters(&self) -> SystemCounters {
        self.lock().counters
    }

    pub fn isolated_modules(&self) -> Vec<String> {
        self.lock().isolated.iter().cloned().collect()
    }

    pub fn current_drift_level(&self) -> u64 {
        self.lock().current_drift_level
    }

    pub fn last_pulse(&self) -> Option<SyncPulse> {
        self.lock().last_pulse.clone()
    }

    /// Mean module health, minus 10 points per isolated module, in `[0, 100]`.
    pub fn aggregate_health_score(&self) -> f64 {
        self.lock().health_score()
    }

    pub fn sync_summary(&self) -> SyncSummary {
        let inner = self.lock();
        let mut summary = SyncSummary {
            current_cycle: inner.master_cycle,
            total_modules: inner.modules.len(),
            current_drift_level: inner.current_drift_level,
            max_drift_observed: inner.max_drift_observed,
            last_pulse: inner.last_pulse.clone(),
            ..SyncSummary::default()
        };
        for status in inner.modules.values() {
            match status.sync_status {
                SyncStatus::InSync => summary.in_sync += 1,
                SyncStatus::Drifting => summary.drifting += 1,
                SyncStatus::OutOfSync => summary.out_of_sync += 1,
                SyncStatus::Realigning => summary.realigning += 1,
            }
        }
        summary
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Consistent copy of the entire store.
    pub fn snapshot(&self) -> SystemSnapshot {
        let inner = self.lock();
        SystemSnapshot {
            taken_at: Utc::now(),
            master_cycle: inner.master_cycle,
            modules: inner.modules.clone(),
            counters: inner.counters,
            isolated: inner.isolated.clone(),
            recovering: inner.recovering.clone(),
            failed: inner.failed.clone(),
            current_drift_level: inner.current_drift_level,
            max_drift_observed: inner.max_drift_observed,
            last_pulse: inner.last_pulse.clone(),
            health_score: inner.health_score(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}
