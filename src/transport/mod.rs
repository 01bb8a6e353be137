//! Module transport: how the monitor and beacon talk to monitored modules
//!
//! The services only see [`ModuleTransport`]; production wires in
//! [`HttpTransport`], tests wire in fakes. Per-call timeouts are enforced
//! by the services with `tokio::time::timeout`, and surface here as
//! [`TransportError::Timeout`].

mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModuleEndpoint;
use crate::types::{SyncAck, SyncBeacon};

/// Health score assumed when a module's health response does not carry one.
pub const DEFAULT_REPORTED_HEALTH: f64 = 100.0;

/// Result of a successful (HTTP 200) health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthProbe {
    /// Score reported by the module, or [`DEFAULT_REPORTED_HEALTH`]
    pub health_score: f64,
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self {
            health_score: DEFAULT_REPORTED_HEALTH,
        }
    }
}

/// Transport failures. The `Display` text is what ends up in a module's
/// `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("Request timeout")]
    Timeout,
    #[error("{0}")]
    Request(reqwest::Error),
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

/// Outbound calls to a monitored module.
#[async_trait]
pub trait ModuleTransport: Send + Sync {
    /// Probe the module's health endpoint.
    async fn check_health(&self, module: &ModuleEndpoint) -> Result<HealthProbe, TransportError>;

    /// Deliver a synchronization beacon and collect the acknowledgment.
    async fn send_sync(
        &self,
        module: &ModuleEndpoint,
        beacon: &SyncBeacon,
    ) -> Result<SyncAck, TransportError>;
}
