//! Derived alerts
//!
//! Alerts are computed from a snapshot on every request and never stored,
//! so they always reflect the store exactly and clear themselves once the
//! underlying condition does.

use crate::config::CansConfig;
use crate::state::policy;
use crate::types::{Alert, AlertKind, AlertSeverity, ModuleState, SystemSnapshot};

/// Limits the alert rules compare against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub max_latency_ms: f64,
    pub max_cycle_drift: u64,
}

impl AlertThresholds {
    pub fn from_config(config: &CansConfig) -> Self {
        Self {
            max_latency_ms: config.monitor.max_latency_ms as f64,
            max_cycle_drift: config.alignment.max_cycle_drift,
        }
    }
}

/// Every active alert in `snapshot`, most severe first.
pub fn derive_alerts(snapshot: &SystemSnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for (name, status) in &snapshot.modules {
        if status.last_heartbeat.is_some() && status.latency_ms > thresholds.max_latency_ms {
            let severity = if status.latency_ms > thresholds.max_latency_ms * 2.0 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            alerts.push(Alert {
                kind: AlertKind::HighLatency,
                severity,
                module: Some(name.clone()),
                message: format!(
                    "{name} latency {:.0} ms exceeds {:.0} ms",
                    status.latency_ms, thresholds.max_latency_ms
                ),
            });
        }

        match status.state {
            ModuleState::Isolated => alerts.push(Alert {
                kind: AlertKind::ModuleIsolated,
                severity: AlertSeverity::Critical,
                module: Some(name.clone()),
                message: match &status.last_error {
                    Some(reason) => format!("{name} is isolated: {reason}"),
                    None => format!("{name} is isolated"),
                },
            }),
            ModuleState::Failed => alerts.push(Alert {
                kind: AlertKind::ModuleFailed,
                severity: AlertSeverity::Critical,
                module: Some(name.clone()),
                message: format!("{name} has failed (health {:.0})", status.health_score),
            }),
            _ => {}
        }

        if status.state != ModuleState::Isolated && status.consecutive_failures > 0 {
            alerts.push(Alert {
                kind: AlertKind::ConsecutiveFailures,
                severity: AlertSeverity::Warning,
                module: Some(name.clone()),
                message: format!(
                    "{name} has {} consecutive failure(s)",
                    status.consecutive_failures
                ),
            });
        }
    }

    let drift = snapshot.current_drift_level;
    if policy::is_misaligned(drift, thresholds.max_cycle_drift) {
        let severity = if policy::is_severe_drift(drift, thresholds.max_cycle_drift) {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(Alert {
            kind: AlertKind::ExcessDrift,
            severity,
            module: None,
            message: format!(
                "cycle drift {drift} exceeds tolerance {}",
                thresholds.max_cycle_drift
            ),
        });
    }

    // Stable, so module order is kept within a severity.
    alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedState;
    use std::time::Duration;

    const THRESHOLDS: AlertThresholds = AlertThresholds {
        max_latency_ms: 1000.0,
        max_cycle_drift: 5,
    };

    fn kinds(alerts: &[Alert]) -> Vec<(AlertKind, AlertSeverity, Option<&str>)> {
        alerts
            .iter()
            .map(|a| (a.kind, a.severity, a.module.as_deref()))
            .collect()
    }

    #[test]
    fn healthy_fleet_has_no_alerts() {
        let store = SharedState::new();
        store.initialize_module("cortex", true);
        store.record_heartbeat("cortex", Duration::from_millis(40), 100.0);

        assert!(derive_alerts(&store.snapshot(), &THRESHOLDS).is_empty());
    }

    #[test]
    fn latency_severity_doubles_at_twice_threshold() {
        let store = SharedState::new();
        store.initialize_module("slow", false);
        store.initialize_module("slower", false);
        store.record_heartbeat("slow", Duration::from_millis(1500), 100.0);
        store.record_heartbeat("slower", Duration::from_millis(2500), 100.0);

        let alerts = derive_alerts(&store.snapshot(), &THRESHOLDS);

        assert_eq!(
            kinds(&alerts),
            vec![
                (AlertKind::HighLatency, AlertSeverity::Critical, Some("slower")),
                (AlertKind::HighLatency, AlertSeverity::Warning, Some("slow")),
            ]
        );
    }

    #[test]
    fn isolation_suppresses_failure_count_alert() {
        let store = SharedState::new();
        store.initialize_module("flaky", true);
        store.initialize_module("wobbly", false);
        for _ in 0..3 {
            store.record_failure("flaky", "HTTP 500");
        }
        store.record_failure("wobbly", "Request timeout");

        let alerts = derive_alerts(&store.snapshot(), &THRESHOLDS);

        assert_eq!(
            kinds(&alerts),
            vec![
                (AlertKind::ModuleIsolated, AlertSeverity::Critical, Some("flaky")),
                (AlertKind::ConsecutiveFailures, AlertSeverity::Warning, Some("wobbly")),
            ]
        );
        assert_eq!(alerts[0].message, "flaky is isolated: HTTP 500");
    }

    #[test]
    fn failed_module_is_critical() {
        let store = SharedState::new();
        store.initialize_module("dead", false);
        store.record_heartbeat("dead", Duration::from_millis(10), 5.0);

        let alerts = derive_alerts(&store.snapshot(), &THRESHOLDS);

        assert_eq!(
            kinds(&alerts),
            vec![(AlertKind::ModuleFailed, AlertSeverity::Critical, Some("dead"))]
        );
    }

    #[test]
    fn drift_alert_is_system_wide() {
        let store = SharedState::new();

        store.set_drift_level(5);
        assert!(derive_alerts(&store.snapshot(), &THRESHOLDS).is_empty());

        store.set_drift_level(7);
        let alerts = derive_alerts(&store.snapshot(), &THRESHOLDS);
        assert_eq!(kinds(&alerts), vec![(AlertKind::ExcessDrift, AlertSeverity::Warning, None)]);

        store.set_drift_level(11);
        let alerts = derive_alerts(&store.snapshot(), &THRESHOLDS);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }
}
