//! Heartbeat Emitter - fixed-interval liveness pulse
//!
//! Each tick stamps a [`Heartbeat`] with the current cycle and aggregate
//! health, publishes it on a `watch` channel for the API, and re-registers
//! any configured module the store doesn't know about yet.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::run_periodic;
use crate::config::{CansConfig, ModuleEndpoint};
use crate::state::SharedState;
use crate::types::Heartbeat;

pub struct HeartbeatEmitter {
    store: Arc<SharedState>,
    modules: Vec<ModuleEndpoint>,
    interval: Duration,
    timeout: Duration,
    tx: watch::Sender<Option<Heartbeat>>,
}

impl HeartbeatEmitter {
    pub fn new(store: Arc<SharedState>, config: &CansConfig) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            store,
            modules: config.endpoints(),
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
            tx,
        }
    }

    /// Receiver for the most recent heartbeat (`None` before the first tick).
    pub fn subscribe(&self) -> watch::Receiver<Option<Heartbeat>> {
        self.tx.subscribe()
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        run_periodic("Heartbeat", self.interval, cancel, move || async move {
            tokio::time::timeout(self.timeout, self.tick())
                .await
                .map_err(|_| anyhow::anyhow!("heartbeat tick exceeded {:?}", self.timeout))?;
            Ok(())
        })
        .await
    }

    /// Emit one heartbeat.
    pub async fn tick(&self) -> Heartbeat {
        let created = self.store.ensure_modules(
            self.modules
                .iter()
                .map(|m| (m.name.as_str(), m.critical)),
        );
        if created > 0 {
            info!(created, "[Heartbeat] Registered configured modules missing from the store");
        }

        let heartbeat = self.store.note_heartbeat_sent();
        debug!(
            cycle = heartbeat.cycle_number,
            health = heartbeat.health_score,
            modules = heartbeat.module_count,
            isolated = heartbeat.isolated_count,
            "[Heartbeat] Pulse"
        );
        self.tx.send_replace(Some(heartbeat.clone()));
        heartbeat
    }
}
