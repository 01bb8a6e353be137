//! Synchronization Beacon - broadcast the next cycle and collect acknowledgments
//!
//! The beacon is the only writer of the master cycle. Each round broadcasts
//! `master + 1` with the current aggregate status to every module at once,
//! classifies each acknowledgment against that cycle, and closes the round
//! with exactly one `record_sync_pulse`. Modules that cannot be reached are
//! recorded as failures, not just as out of sync.

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{panic_message, run_periodic};
use crate::config::{CansConfig, ModuleEndpoint};
use crate::state::{policy, SharedState};
use crate::transport::{ModuleTransport, TransportError};
use crate::types::SyncBeacon;

/// Result of one beacon round, as passed to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeaconRound {
    /// Master cycle after the round
    pub cycle: u64,
    pub modules_in_sync: usize,
    pub total_modules: usize,
    pub drift_detected: bool,
    pub max_drift: u64,
    /// Modules whose send failed or timed out
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckOutcome {
    Acked { drift: u64 },
    Unreachable,
}

pub struct SyncBeaconService {
    store: Arc<SharedState>,
    transport: Arc<dyn ModuleTransport>,
    modules: Vec<ModuleEndpoint>,
    interval: Duration,
    timeout: Duration,
    max_cycle_drift: u64,
}

impl SyncBeaconService {
    pub fn new(
        store: Arc<SharedState>,
        transport: Arc<dyn ModuleTransport>,
        config: &CansConfig,
    ) -> Self {
        Self {
            store,
            transport,
            modules: config.endpoints(),
            interval: config.sync_interval(),
            timeout: config.sync_timeout(),
            max_cycle_drift: config.alignment.max_cycle_drift,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        run_periodic("SyncBeacon", self.interval, cancel, move || async move {
            self.run_round().await;
            Ok(())
        })
        .await
    }

    /// Build the beacon payload from the not-yet-advanced aggregate state.
    fn build_beacon(&self) -> SyncBeacon {
        let snapshot = self.store.snapshot();
        SyncBeacon {
            cycle_number: snapshot.master_cycle.saturating_add(1),
            timestamp: Utc::now(),
            system_health: snapshot.health_score,
            total_modules: snapshot.modules.len(),
            isolated_modules: snapshot.isolated.len(),
        }
    }

    /// One complete broadcast-and-collect pass.
    pub async fn run_round(&self) -> BeaconRound {
        self.store.ensure_modules(
            self.modules
                .iter()
                .map(|m| (m.name.as_str(), m.critical)),
        );

        let beacon = self.build_beacon();
        let beacon_ref = &beacon;

        let outcomes = join_all(self.modules.iter().map(move |module| async move {
            AssertUnwindSafe(self.exchange(module, beacon_ref))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(module = %module.name, panic = %message, "[SyncBeacon] Broadcast panicked");
                    self.store
                        .record_failure(&module.name, &format!("Internal error: {message}"));
                    AckOutcome::Unreachable
                })
        }))
        .await;

        let mut round = BeaconRound {
            total_modules: outcomes.len(),
            ..BeaconRound::default()
        };
        for outcome in outcomes {
            match outcome {
                AckOutcome::Acked { drift } => {
                    round.max_drift = round.max_drift.max(drift);
                    if !policy::is_misaligned(drift, self.max_cycle_drift) {
                        round.modules_in_sync += 1;
                    }
                }
                AckOutcome::Unreachable => round.failures += 1,
            }
        }
        round.drift_detected = policy::is_misaligned(round.max_drift, self.max_cycle_drift);

        round.cycle = self.store.record_sync_pulse(
            round.modules_in_sync,
            round.total_modules,
            round.drift_detected,
            round.max_drift,
        );

        if round.drift_detected || round.failures > 0 {
            info!(
                cycle = round.cycle,
                in_sync = round.modules_in_sync,
                total = round.total_modules,
                max_drift = round.max_drift,
                failures = round.failures,
                "[SyncBeacon] Round complete"
            );
        } else {
            debug!(
                cycle = round.cycle,
                in_sync = round.modules_in_sync,
                total = round.total_modules,
                "[SyncBeacon] Round complete"
            );
        }
        round
    }

    async fn exchange(&self, module: &ModuleEndpoint, beacon: &SyncBeacon) -> AckOutcome {
        let result = tokio::time::timeout(self.timeout, self.transport.send_sync(module, beacon))
            .await
            .unwrap_or(Err(TransportError::Timeout));

        match result {
            Ok(ack) => {
                // A module that reports no cycle has adopted the broadcast one.
                let reported = ack.cycle_number.unwrap_or(beacon.cycle_number);
                let drift = self
                    .store
                    .record_sync_ack(&module.name, reported, beacon.cycle_number, self.max_cycle_drift)
                    .unwrap_or(0);
                if policy::is_misaligned(drift, self.max_cycle_drift) {
                    warn!(
                        module = %module.name,
                        reported,
                        expected = beacon.cycle_number,
                        drift,
                        "[SyncBeacon] Acknowledged cycle out of tolerance"
                    );
                }
                AckOutcome::Acked { drift }
            }
            Err(e) => {
                debug!(module = %module.name, error = %e, "[SyncBeacon] Sync send failed");
                self.store.record_failure(&module.name, &e.to_string());
                AckOutcome::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{test_config, ScriptedTransport, SyncScript};
    use crate::types::{ModuleState, SyncStatus};

    fn beacon_for(
        modules: &[(&str, bool)],
        transport: Arc<ScriptedTransport>,
    ) -> (Arc<SharedState>, SyncBeaconService) {
        let store = Arc::new(SharedState::new());
        let service = SyncBeaconService::new(Arc::clone(&store), transport, &test_config(modules));
        (store, service)
    }

    #[tokio::test]
    async fn partial_round_still_advances_cycle_once() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .sync("a", SyncScript::Ack(Some(1)))
            .sync("b", SyncScript::Ack(None))
            .sync("c", SyncScript::Hang);
        let (store, service) = beacon_for(&[("a", true), ("b", true), ("c", false)], transport);

        let round = service.run_round().await;

        assert_eq!(round.cycle, 1);
        assert_eq!(round.modules_in_sync, 2);
        assert_eq!(round.total_modules, 3);
        assert_eq!(round.failures, 1);
        assert!(!round.drift_detected);
        assert_eq!(store.master_cycle(), 1);
        assert_eq!(store.counters().sync_pulses, 1);

        let pulse = store.last_pulse().unwrap();
        assert_eq!(pulse.modules_in_sync, 2);
        assert_eq!(pulse.total_modules, 3);

        let timed_out = store.module("c").unwrap();
        assert_eq!(timed_out.consecutive_failures, 1);
        assert_eq!(timed_out.last_error.as_deref(), Some("Request timeout"));
        assert_eq!(store.module("a").unwrap().sync_status, SyncStatus::InSync);
    }

    #[tokio::test]
    async fn drifting_ack_is_out_of_sync_and_reported() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.sync("lagging", SyncScript::Ack(Some(0)));
        let (store, service) = beacon_for(&[("lagging", false)], transport);

        // Master 0 -> the beacon announces 1; push the master ahead first.
        for _ in 0..9 {
            store.record_sync_pulse(0, 0, false, 0);
        }
        let round = service.run_round().await;

        assert_eq!(round.max_drift, 10);
        assert!(round.drift_detected);
        assert_eq!(round.modules_in_sync, 0);
        assert_eq!(store.master_cycle(), 10);
        assert_eq!(store.current_drift_level(), 10);

        let status = store.module("lagging").unwrap();
        assert_eq!(status.cycle_number, 0);
        assert_eq!(status.sync_status, SyncStatus::OutOfSync);
    }

    #[tokio::test]
    async fn beacon_carries_next_cycle_and_aggregates() {
        let transport = Arc::new(ScriptedTransport::default());
        let (store, service) =
            beacon_for(&[("a", false), ("b", false)], Arc::clone(&transport));
        store.initialize_module("a", false);
        store.initialize_module("b", false);
        store.isolate_module("b", "manual");

        service.run_round().await;

        let sent = transport.beacons();
        assert_eq!(sent.len(), 2);
        for (_, beacon) in &sent {
            assert_eq!(beacon.cycle_number, 1);
            assert_eq!(beacon.total_modules, 2);
            assert_eq!(beacon.isolated_modules, 1);
            assert_eq!(beacon.system_health, 90.0);
        }
    }

    #[tokio::test]
    async fn empty_fleet_still_records_pulse() {
        let transport = Arc::new(ScriptedTransport::default());
        let (store, service) = beacon_for(&[], transport);

        let round = service.run_round().await;

        assert_eq!(round.total_modules, 0);
        assert_eq!(round.cycle, 1);
        assert_eq!(store.master_cycle(), 1);
    }

    #[tokio::test]
    async fn repeated_send_errors_isolate() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.sync("down", SyncScript::Status(502));
        let (store, service) = beacon_for(&[("down", true)], transport);

        for _ in 0..3 {
            service.run_round().await;
        }

        let status = store.module("down").unwrap();
        assert_eq!(status.state, ModuleState::Isolated);
        assert_eq!(status.last_error.as_deref(), Some("HTTP 502"));
        assert_eq!(store.master_cycle(), 3);
    }
}
