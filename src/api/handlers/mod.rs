//! API route handlers
//!
//! - Liveness, fleet status, per-module detail and counters
//! - Synchronization summary, module self-reported acks, forced sync
//! - Administrative isolation/recovery and derived alerts

mod admin;
mod status;
mod sync;

pub use admin::*;
pub use status::*;
pub use sync::*;

use std::sync::Arc;
use tokio::sync::watch;

use crate::alerts::AlertThresholds;
use crate::config::CansConfig;
use crate::state::SharedState;
use crate::types::Heartbeat;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SharedState>,
    pub thresholds: AlertThresholds,
    /// Latest pulse from the heartbeat emitter
    pub heartbeat: watch::Receiver<Option<Heartbeat>>,
}

impl ApiState {
    pub fn new(
        store: Arc<SharedState>,
        config: &CansConfig,
        heartbeat: watch::Receiver<Option<Heartbeat>>,
    ) -> Self {
        Self {
            store,
            thresholds: AlertThresholds::from_config(config),
            heartbeat,
        }
    }

    pub fn max_cycle_drift(&self) -> u64 {
        self.thresholds.max_cycle_drift
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// State over a fresh store with default thresholds and no heartbeat yet.
    pub(crate) fn create_test_state() -> ApiState {
        let (_tx, rx) = watch::channel(None);
        ApiState::new(Arc::new(SharedState::new()), &CansConfig::default(), rx)
    }
}
