//! reqwest-backed [`ModuleTransport`]

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{HealthProbe, ModuleTransport, TransportError, DEFAULT_REPORTED_HEALTH};
use crate::config::defaults::HTTP_CLIENT_TIMEOUT_SECS;
use crate::config::ModuleEndpoint;
use crate::types::{SyncAck, SyncBeacon};

/// HTTP client for module health checks and beacon delivery.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
    }

    /// Build with an explicit client-level timeout. A request that hits it
    /// surfaces as [`TransportError::Timeout`].
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

/// Pull a health score out of a module's JSON body.
///
/// Accepts `health_score` or `score`; anything else (including a non-JSON
/// body) yields the default.
pub(crate) fn parse_health_score(body: &[u8]) -> f64 {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("health_score")
                .or_else(|| v.get("score"))
                .and_then(serde_json::Value::as_f64)
        })
        .unwrap_or(DEFAULT_REPORTED_HEALTH)
}

/// Pull a cycle number out of a module's beacon reply. An empty body is a
/// bare acknowledgment.
pub(crate) fn parse_sync_ack(body: &[u8]) -> Result<SyncAck, TransportError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SyncAck::default());
    }
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| TransportError::InvalidBody(e.to_string()))?;
    let cycle_number = value
        .get("cycle_number")
        .or_else(|| value.get("cycle"))
        .and_then(serde_json::Value::as_u64);
    Ok(SyncAck { cycle_number })
}

#[async_trait]
impl ModuleTransport for HttpTransport {
    async fn check_health(&self, module: &ModuleEndpoint) -> Result<HealthProbe, TransportError> {
        let resp = self.http.get(module.health_url()).send().await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        let health_score = parse_health_score(&body);
        debug!(module = %module.name, health_score, "Health probe ok");
        Ok(HealthProbe { health_score })
    }

    async fn send_sync(
        &self,
        module: &ModuleEndpoint,
        beacon: &SyncBeacon,
    ) -> Result<SyncAck, TransportError> {
        let resp = self
            .http
            .post(module.sync_url())
            .json(beacon)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        parse_sync_ack(&body)
    }
}
