//! Module Monitor - concurrent health checks feeding the failure/recovery policy
//!
//! Every cycle probes all registered modules at once, each under its own
//! timeout, and waits for every probe to resolve before the sync-status
//! post-pass. A slow or failing module never delays another module's check.

use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{panic_message, run_periodic};
use crate::config::{CansConfig, ModuleEndpoint};
use crate::state::SharedState;
use crate::transport::{ModuleTransport, TransportError};

/// Outcome of one monitoring cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub checked: usize,
    pub healthy: usize,
    pub failed: usize,
    pub high_latency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOutcome {
    Healthy { slow: bool },
    Failed,
}

pub struct ModuleMonitor {
    store: Arc<SharedState>,
    transport: Arc<dyn ModuleTransport>,
    modules: Vec<ModuleEndpoint>,
    interval: Duration,
    timeout: Duration,
    max_latency: Duration,
}

impl ModuleMonitor {
    pub fn new(
        store: Arc<SharedState>,
        transport: Arc<dyn ModuleTransport>,
        config: &CansConfig,
    ) -> Self {
        Self {
            store,
            transport,
            modules: config.endpoints(),
            interval: config.monitor_interval(),
            timeout: config.monitor_timeout(),
            max_latency: config.max_latency(),
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        run_periodic("ModuleMonitor", self.interval, cancel, move || async move {
            self.run_cycle().await;
            Ok(())
        })
        .await
    }

    /// Check every module once, then couple the results to sync status.
    pub async fn run_cycle(&self) -> MonitorReport {
        self.store.ensure_modules(
            self.modules
                .iter()
                .map(|m| (m.name.as_str(), m.critical)),
        );

        let outcomes = join_all(self.modules.iter().map(move |module| async move {
            let outcome = AssertUnwindSafe(self.check_module(module))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(module = %module.name, panic = %message, "[ModuleMonitor] Health check panicked");
                    self.store
                        .record_failure(&module.name, &format!("Internal error: {message}"));
                    CheckOutcome::Failed
                });
            (module.name.as_str(), outcome)
        }))
        .await;

        let mut report = MonitorReport {
            checked: outcomes.len(),
            ..MonitorReport::default()
        };
        for (name, outcome) in &outcomes {
            let succeeded = matches!(outcome, CheckOutcome::Healthy { .. });
            match outcome {
                CheckOutcome::Healthy { slow } => {
                    report.healthy += 1;
                    if *slow {
                        report.high_latency += 1;
                    }
                }
                CheckOutcome::Failed => report.failed += 1,
            }
            self.store.apply_health_sync(name, succeeded);
        }

        let cycle = self.store.note_monitoring_cycle();
        if report.failed > 0 {
            info!(
                cycle,
                checked = report.checked,
                failed = report.failed,
                "[ModuleMonitor] Cycle complete with failures"
            );
        } else {
            debug!(cycle, checked = report.checked, "[ModuleMonitor] Cycle complete");
        }
        report
    }

    async fn check_module(&self, module: &ModuleEndpoint) -> CheckOutcome {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.transport.check_health(module))
            .await
            .unwrap_or(Err(TransportError::Timeout));

        match result {
            Ok(probe) => {
                let latency = started.elapsed();
                let slow = latency > self.max_latency;
                if slow {
                    warn!(
                        module = %module.name,
                        latency_ms = latency.as_millis() as u64,
                        threshold_ms = self.max_latency.as_millis() as u64,
                        "[ModuleMonitor] High latency"
                    );
                } else if latency > module.expected_response {
                    debug!(
                        module = %module.name,
                        latency_ms = latency.as_millis() as u64,
                        "[ModuleMonitor] Slower than expected response time"
                    );
                }
                self.store
                    .record_heartbeat(&module.name, latency, probe.health_score);
                CheckOutcome::Healthy { slow }
            }
            Err(e) => {
                debug!(module = %module.name, error = %e, "[ModuleMonitor] Health check failed");
                self.store.record_failure(&module.name, &e.to_string());
                CheckOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{test_config, HealthScript, ScriptedTransport};
    use crate::types::{ModuleState, SyncStatus};

    fn monitor_for(
        modules: &[(&str, bool)],
        transport: ScriptedTransport,
    ) -> (Arc<SharedState>, ModuleMonitor) {
        let store = Arc::new(SharedState::new());
        let monitor = ModuleMonitor::new(
            Arc::clone(&store),
            Arc::new(transport),
            &test_config(modules),
        );
        (store, monitor)
    }

    #[tokio::test]
    async fn classifies_each_failure_kind() {
        let transport = ScriptedTransport::default();
        transport
            .health("healthy", HealthScript::Score(90.0))
            .health("erroring", HealthScript::Status(503))
            .health("hung", HealthScript::Hang);
        let (store, monitor) = monitor_for(
            &[("healthy", false), ("erroring", false), ("hung", true)],
            transport,
        );

        let report = monitor.run_cycle().await;

        assert_eq!(report.checked, 3);
        assert_eq!(report.healthy, 1);
        assert_eq!(report.failed, 2);

        let healthy = store.module("healthy").unwrap();
        assert_eq!(healthy.state, ModuleState::Operational);
        assert_eq!(healthy.sync_status, SyncStatus::InSync);
        assert_eq!(healthy.health_score, 90.0);

        let erroring = store.module("erroring").unwrap();
        assert_eq!(erroring.state, ModuleState::Degraded);
        assert_eq!(erroring.sync_status, SyncStatus::OutOfSync);
        assert_eq!(erroring.last_error.as_deref(), Some("HTTP 503"));

        let hung = store.module("hung").unwrap();
        assert_eq!(hung.last_error.as_deref(), Some("Request timeout"));
        assert_eq!(store.counters().monitoring_cycles, 1);
    }

    #[tokio::test]
    async fn slow_module_does_not_delay_others() {
        let transport = ScriptedTransport::default();
        transport
            .health("a", HealthScript::Hang)
            .health("b", HealthScript::Hang)
            .health("c", HealthScript::Hang)
            .health("d", HealthScript::Score(100.0));
        let (store, monitor) = monitor_for(
            &[("a", false), ("b", false), ("c", false), ("d", false)],
            transport,
        );

        let started = Instant::now();
        monitor.run_cycle().await;
        // Three 100 ms timeouts run side by side, not back to back.
        assert!(started.elapsed() < Duration::from_millis(280));
        assert_eq!(store.module("d").unwrap().state, ModuleState::Operational);
    }

    #[tokio::test]
    async fn three_failed_cycles_isolate() {
        let transport = ScriptedTransport::default();
        transport.health("flaky", HealthScript::Status(500));
        let (store, monitor) = monitor_for(&[("flaky", true)], transport);

        for _ in 0..3 {
            monitor.run_cycle().await;
        }

        let status = store.module("flaky").unwrap();
        assert_eq!(status.consecutive_failures, 3);
        assert_eq!(status.state, ModuleState::Isolated);
    }

    #[tokio::test]
    async fn high_latency_warns_without_changing_state() {
        let transport = ScriptedTransport::default();
        transport.health("slow", HealthScript::Slow(Duration::from_millis(50), 95.0));
        let (store, monitor) = monitor_for(&[("slow", false)], transport);

        let report = monitor.run_cycle().await;

        assert_eq!(report.high_latency, 1);
        let status = store.module("slow").unwrap();
        assert_eq!(status.state, ModuleState::Operational);
        assert!(status.latency_ms >= 50.0);
    }

    #[tokio::test]
    async fn panicking_check_is_recorded_as_failure() {
        let transport = ScriptedTransport::default();
        transport
            .health("broken", HealthScript::Panic)
            .health("fine", HealthScript::Score(100.0));
        let (store, monitor) = monitor_for(&[("broken", false), ("fine", false)], transport);

        let report = monitor.run_cycle().await;

        assert_eq!(report.failed, 1);
        assert_eq!(store.module("fine").unwrap().state, ModuleState::Operational);
        assert!(store
            .module("broken")
            .unwrap()
            .last_error
            .unwrap()
            .starts_with("Internal error"));
    }
}
