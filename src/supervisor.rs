//! Composition root and task supervision
//!
//! [`Synchronizer`] owns the shared store and the four background services.
//! Each service and the HTTP server run as a task in one `JoinSet` under a
//! shared `CancellationToken`. On shutdown every loop finishes its current
//! iteration and returns; whatever is still running after the grace period
//! is aborted.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{create_app, ApiState};
use crate::background::{CycleAligner, HeartbeatEmitter, ModuleMonitor, SyncBeaconService};
use crate::config::{defaults, CansConfig};
use crate::state::SharedState;
use crate::transport::ModuleTransport;

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    HttpServer,
    HeartbeatEmitter,
    ModuleMonitor,
    SyncBeacon,
    CycleAligner,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::HeartbeatEmitter => write!(f, "HeartbeatEmitter"),
            TaskName::ModuleMonitor => write!(f, "ModuleMonitor"),
            TaskName::SyncBeacon => write!(f, "SyncBeacon"),
            TaskName::CycleAligner => write!(f, "CycleAligner"),
        }
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Everything one synchronizer process runs, wired to a single store.
pub struct Synchronizer {
    store: Arc<SharedState>,
    heartbeat: Arc<HeartbeatEmitter>,
    monitor: Arc<ModuleMonitor>,
    beacon: Arc<SyncBeaconService>,
    aligner: Arc<CycleAligner>,
    api_state: ApiState,
    grace: Duration,
}

impl Synchronizer {
    pub fn new(config: &CansConfig, transport: Arc<dyn ModuleTransport>) -> Self {
        let store = Arc::new(SharedState::new());

        // Register the configured fleet up front; the loops re-check every tick.
        let created = store.ensure_modules(
            config
                .modules
                .iter()
                .map(|(name, module)| (name.as_str(), module.critical)),
        );
        info!(modules = created, "[Synchronizer] Module table registered");

        let heartbeat = Arc::new(HeartbeatEmitter::new(Arc::clone(&store), config));
        let api_state = ApiState::new(Arc::clone(&store), config, heartbeat.subscribe());

        Self {
            monitor: Arc::new(ModuleMonitor::new(
                Arc::clone(&store),
                Arc::clone(&transport),
                config,
            )),
            beacon: Arc::new(SyncBeaconService::new(Arc::clone(&store), transport, config)),
            aligner: Arc::new(CycleAligner::new(Arc::clone(&store), config)),
            heartbeat,
            api_state,
            store,
            grace: Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS),
        }
    }

    /// Override the shutdown grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn store(&self) -> Arc<SharedState> {
        Arc::clone(&self.store)
    }

    pub fn api_state(&self) -> ApiState {
        self.api_state.clone()
    }

    /// Spawn the four background loops into `task_set`.
    pub fn spawn_loops(
        &self,
        task_set: &mut JoinSet<Result<TaskName>>,
        cancel_token: &CancellationToken,
    ) {
        let heartbeat = Arc::clone(&self.heartbeat);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            heartbeat.run(cancel).await;
            Ok(TaskName::HeartbeatEmitter)
        });

        let monitor = Arc::clone(&self.monitor);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            monitor.run(cancel).await;
            Ok(TaskName::ModuleMonitor)
        });

        let beacon = Arc::clone(&self.beacon);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            beacon.run(cancel).await;
            Ok(TaskName::SyncBeacon)
        });

        let aligner = Arc::clone(&self.aligner);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            aligner.run(cancel).await;
            Ok(TaskName::CycleAligner)
        });
    }

    /// Run the loops, and the HTTP API if a listener is given, until
    /// `cancel_token` fires or a task fails.
    pub async fn run(
        self,
        listener: Option<TcpListener>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        info!("[Supervisor] Initializing task monitoring");
        let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

        if let Some(listener) = listener {
            let app = create_app(self.api_state());
            spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
        }
        self.spawn_loops(&mut task_set, &cancel_token);

        run_supervisor(&mut task_set, cancel_token, self.grace).await
    }
}

/// Spawn the HTTP server task into the JoinSet.
pub fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        info!(addr = %addr, "[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!(error = %e, "[HttpServer] Server error");
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Supervise `task_set` until cancellation or the first task failure, then
/// drain it within `grace`.
pub async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
    grace: Duration,
) -> Result<()> {
    info!(tasks = task_set.len(), "[Supervisor] All tasks spawned, monitoring");
    let mut failure: Option<anyhow::Error> = None;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("[Supervisor] Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        warn!(task = %task_name, "[Supervisor] Task exited before shutdown");
                    }
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "[Supervisor] Task failed, shutting down");
                        failure = Some(e);
                        cancel_token.cancel();
                        break;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "[Supervisor] Task panicked, shutting down");
                        failure = Some(anyhow::anyhow!("Task panicked: {}", e));
                        cancel_token.cancel();
                        break;
                    }
                    None => {
                        info!("[Supervisor] All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    drain(task_set, grace).await;

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Wait up to `grace` for every task to return, then abort the rest.
async fn drain(task_set: &mut JoinSet<Result<TaskName>>, grace: Duration) {
    let drained = tokio::time::timeout(grace, async {
        while let Some(result) = task_set.join_next().await {
            match result {
                Ok(Ok(task_name)) => info!(task = %task_name, "[Supervisor] Task stopped"),
                Ok(Err(e)) => warn!(error = %e, "[Supervisor] Task failed during shutdown"),
                Err(e) => warn!(error = %e, "[Supervisor] Task panicked during shutdown"),
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = task_set.len(),
            grace_secs = grace.as_secs_f64(),
            "[Supervisor] Grace period elapsed, aborting remaining tasks"
        );
        task_set.abort_all();
        while task_set.join_next().await.is_some() {}
    }
    info!("[Supervisor] Shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{test_config, ScriptedTransport};

    fn fast_config(modules: &[(&str, bool)]) -> CansConfig {
        let mut config = test_config(modules);
        config.heartbeat.interval_ms = 10;
        config.sync.interval_ms = 10;
        config.monitor.interval_ms = 10;
        config.alignment.check_interval_ms = 5;
        config
    }

    #[test]
    fn new_registers_configured_modules() {
        let config = fast_config(&[("cortex", true), ("limbic", false)]);
        let sync = Synchronizer::new(&config, Arc::new(ScriptedTransport::default()));

        let store = sync.store();
        assert_eq!(store.module_count(), 2);
        assert!(store.module("cortex").unwrap().is_critical);
    }

    #[tokio::test]
    async fn loops_advance_and_stop_on_cancel() {
        let config = fast_config(&[("cortex", true)]);
        let sync = Synchronizer::new(&config, Arc::new(ScriptedTransport::default()))
            .with_grace(Duration::from_secs(2));
        let store = sync.store();
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stopper.cancel();
        });

        sync.run(None, cancel).await.unwrap();

        let counters = store.counters();
        assert!(store.master_cycle() > 0);
        assert!(counters.heartbeats_sent > 0);
        assert!(counters.monitoring_cycles > 0);
        assert_eq!(counters.sync_pulses, store.master_cycle());
        assert_eq!(
            store.module("cortex").unwrap().state,
            crate::types::ModuleState::Operational
        );
    }

    #[tokio::test]
    async fn failing_task_cancels_the_rest() {
        let cancel = CancellationToken::new();
        let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

        let waiter = cancel.clone();
        task_set.spawn(async move {
            waiter.cancelled().await;
            Ok(TaskName::CycleAligner)
        });
        task_set.spawn(async { Err(anyhow::anyhow!("boom")) });

        let result = run_supervisor(&mut task_set, cancel.clone(), Duration::from_secs(1)).await;

        assert!(result.is_err());
        assert!(cancel.is_cancelled());
        assert!(task_set.is_empty());
    }

    #[tokio::test]
    async fn stragglers_are_aborted_after_grace() {
        let cancel = CancellationToken::new();
        let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
        task_set.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TaskName::ModuleMonitor)
        });
        cancel.cancel();

        let started = std::time::Instant::now();
        run_supervisor(&mut task_set, cancel, Duration::from_millis(50))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(task_set.is_empty());
    }
}
