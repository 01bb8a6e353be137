//! Cycle Aligner - drift detection between beacon rounds
//!
//! Runs at a tighter cadence than the beacon. Every pass compares each
//! module's acknowledged cycle with the master cycle:
//!
//! - drift beyond `max_cycle_drift` marks the module OutOfSync
//! - a misaligned critical module beyond twice the tolerance is isolated
//! - any other misaligned module is set Realigning for the next beacon round
//!
//! The pass then overwrites the store's current drift level with the largest
//! drift it saw, so the level falls again once modules catch up.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::run_periodic;
use crate::config::CansConfig;
use crate::state::{policy, SharedState};
use crate::types::ModuleStatus;

/// Isolation reason recorded for severe drift.
pub const SEVERE_DRIFT_REASON: &str = "severe cycle drift";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentAction {
    Isolate,
    Realign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Misalignment {
    pub name: String,
    pub drift: u64,
    pub action: AlignmentAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    pub master_cycle: u64,
    /// Largest drift seen across all modules, aligned or not
    pub max_drift: u64,
    pub misaligned: Vec<Misalignment>,
}

impl AlignmentReport {
    pub fn isolated(&self) -> usize {
        self.count(AlignmentAction::Isolate)
    }

    pub fn realigning(&self) -> usize {
        self.count(AlignmentAction::Realign)
    }

    fn count(&self, action: AlignmentAction) -> usize {
        self.misaligned.iter().filter(|m| m.action == action).count()
    }
}

/// Decide the action for every module. No side effects.
pub fn assess_alignment(
    master_cycle: u64,
    modules: &BTreeMap<String, ModuleStatus>,
    max_cycle_drift: u64,
) -> AlignmentReport {
    let mut report = AlignmentReport {
        master_cycle,
        ..AlignmentReport::default()
    };

    for status in modules.values() {
        let drift = status.drift_from(master_cycle);
        report.max_drift = report.max_drift.max(drift);

        if !policy::is_misaligned(drift, max_cycle_drift) {
            continue;
        }

        let action = if status.is_critical && policy::is_severe_drift(drift, max_cycle_drift) {
            AlignmentAction::Isolate
        } else {
            AlignmentAction::Realign
        };
        report.misaligned.push(Misalignment {
            name: status.name.clone(),
            drift,
            action,
        });
    }

    report
}

pub struct CycleAligner {
    store: Arc<SharedState>,
    interval: Duration,
    max_cycle_drift: u64,
}

impl CycleAligner {
    pub fn new(store: Arc<SharedState>, config: &CansConfig) -> Self {
        Self {
            store,
            interval: config.cycle_check_interval(),
            max_cycle_drift: config.alignment.max_cycle_drift,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        run_periodic("CycleAligner", self.interval, cancel, move || async move {
            self.run_pass();
            Ok(())
        })
        .await
    }

    /// Assess every module against the master cycle and apply the result.
    pub fn run_pass(&self) -> AlignmentReport {
        let snapshot = self.store.snapshot();
        let report = assess_alignment(snapshot.master_cycle, &snapshot.modules, self.max_cycle_drift);

        for misaligned in &report.misaligned {
            self.store.mark_out_of_sync(&misaligned.name);
            match misaligned.action {
                AlignmentAction::Isolate => {
                    let newly = self
                        .store
                        .isolate_module(&misaligned.name, SEVERE_DRIFT_REASON)
                        .unwrap_or(false);
                    if newly {
                        warn!(
                            module = %misaligned.name,
                            drift = misaligned.drift,
                            master_cycle = report.master_cycle,
                            "[CycleAligner] Severe drift on critical module, isolating"
                        );
                    }
                }
                AlignmentAction::Realign => {
                    self.store.mark_realigning(&misaligned.name);
                    debug!(
                        module = %misaligned.name,
                        drift = misaligned.drift,
                        "[CycleAligner] Module realigning"
                    );
                }
            }
        }

        self.store.set_drift_level(report.max_drift);
        report
    }
}
