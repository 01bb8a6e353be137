//! Scripted transport for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{HealthProbe, ModuleTransport, TransportError};
use crate::config::ModuleEndpoint;
use crate::types::{SyncAck, SyncBeacon};

#[derive(Debug, Clone)]
pub(crate) enum HealthScript {
    Score(f64),
    Status(u16),
    /// Respond with `score` after `delay`
    Slow(Duration, f64),
    Hang,
    Panic,
}

#[derive(Debug, Clone)]
pub(crate) enum SyncScript {
    Ack(Option<u64>),
    Status(u16),
    Hang,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    health: Mutex<HashMap<String, HealthScript>>,
    sync: Mutex<HashMap<String, SyncScript>>,
    beacons: Mutex<Vec<(String, SyncBeacon)>>,
}

impl ScriptedTransport {
    pub(crate) fn health(&self, module: &str, script: HealthScript) -> &Self {
        self.health.lock().unwrap().insert(module.to_string(), script);
        self
    }

    pub(crate) fn sync(&self, module: &str, script: SyncScript) -> &Self {
        self.sync.lock().unwrap().insert(module.to_string(), script);
        self
    }

    pub(crate) fn beacons(&self) -> Vec<(String, SyncBeacon)> {
        self.beacons.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModuleTransport for ScriptedTransport {
    async fn check_health(&self, module: &ModuleEndpoint) -> Result<HealthProbe, TransportError> {
        let script = self
            .health
            .lock()
            .unwrap()
            .get(&module.name)
            .cloned()
            .unwrap_or(HealthScript::Score(100.0));
        match script {
            HealthScript::Score(health_score) => Ok(HealthProbe { health_score }),
            HealthScript::Status(code) => Err(TransportError::Status(code)),
            HealthScript::Slow(delay, health_score) => {
                tokio::time::sleep(delay).await;
                Ok(HealthProbe { health_score })
            }
            HealthScript::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(HealthProbe::default())
            }
            HealthScript::Panic => panic!("scripted health check panic"),
        }
    }

    async fn send_sync(
        &self,
        module: &ModuleEndpoint,
        beacon: &SyncBeacon,
    ) -> Result<SyncAck, TransportError> {
        self.beacons
            .lock()
            .unwrap()
            .push((module.name.clone(), beacon.clone()));
        let script = self
            .sync
            .lock()
            .unwrap()
            .get(&module.name)
            .cloned()
            .unwrap_or(SyncScript::Ack(None));
        match script {
            SyncScript::Ack(cycle_number) => Ok(SyncAck { cycle_number }),
            SyncScript::Status(code) => Err(TransportError::Status(code)),
            SyncScript::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(SyncAck::default())
            }
        }
    }
}

/// Config with the given `(name, critical)` modules and tight timeouts.
pub(crate) fn test_config(modules: &[(&str, bool)]) -> crate::config::CansConfig {
    let mut config = crate::config::CansConfig::default();
    config.monitor.timeout_ms = 100;
    config.monitor.max_latency_ms = 30;
    config.sync.timeout_ms = 100;
    for (i, (name, critical)) in modules.iter().enumerate() {
        let mut module = crate::config::ModuleConfig::new(format!("http://127.0.0.1:{}", 7000 + i));
        module.critical = *critical;
        config.modules.insert((*name).to_string(), module);
    }
    config
}
