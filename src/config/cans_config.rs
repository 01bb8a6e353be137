//! Synchronizer Configuration - intervals, thresholds and the monitored module table
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so a deployment with no config file and no environment still runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a synchronizer deployment.
///
/// Load with `CansConfig::load()` which searches:
/// 1. `$CANS_CONFIG` env var
/// 2. `./cans.toml`
/// 3. Built-in defaults
///
/// and then applies `CANS_*` environment overrides on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CansConfig {
    /// HTTP transport layer
    #[serde(default)]
    pub server: ServerConfig,

    /// Heartbeat emitter cadence
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Synchronization beacon cadence
    #[serde(default)]
    pub sync: SyncConfig,

    /// Module monitor cadence and latency threshold
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Cycle aligner cadence and drift tolerance
    #[serde(default)]
    pub alignment: AlignmentConfig,

    /// Static table of monitored modules, keyed by module name
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::HEARTBEAT_INTERVAL_MS,
            timeout_ms: defaults::HEARTBEAT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::SYNC_INTERVAL_MS,
            timeout_ms: defaults::SYNC_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    /// Latency above which a high-latency warning is emitted
    pub max_latency_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::MONITOR_INTERVAL_MS,
            timeout_ms: defaults::MONITOR_TIMEOUT_MS,
            max_latency_ms: defaults::MAX_LATENCY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlignmentConfig {
    pub check_interval_ms: u64,
    pub max_cycle_drift: u64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: defaults::CYCLE_CHECK_INTERVAL_MS,
            max_cycle_drift: defaults::MAX_CYCLE_DRIFT,
        }
    }
}

/// One entry of the monitored module table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleConfig {
    pub base_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_sync_path")]
    pub sync_path: String,
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_expected_response_ms")]
    pub expected_response_ms: u64,
}

fn default_health_path() -> String {
    defaults::MODULE_HEALTH_PATH.to_string()
}

fn default_sync_path() -> String {
    defaults::MODULE_SYNC_PATH.to_string()
}

fn default_expected_response_ms() -> u64 {
    defaults::MODULE_EXPECTED_RESPONSE_MS
}

impl ModuleConfig {
    /// Module at `base_url` with default paths, not critical.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            health_path: default_health_path(),
            sync_path: default_sync_path(),
            critical: false,
            expected_response_ms: default_expected_response_ms(),
        }
    }
}

/// Resolved view of a monitored module handed to the services and transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEndpoint {
    pub name: String,
    pub base_url: String,
    pub health_path: String,
    pub sync_path: String,
    pub critical: bool,
    pub expected_response: Duration,
}

impl ModuleEndpoint {
    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }

    pub fn sync_url(&self) -> String {
        join_url(&self.base_url, &self.sync_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ============================================================================
// Loading
// ============================================================================

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "CANS_CONFIG";

/// Config file looked up in the working directory when `CANS_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "cans.toml";

impl CansConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), but an explicit path (e.g. `--config`)
    /// takes precedence over `CANS_CONFIG`.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let mut config = if let Some(path) = explicit.map(Path::to_path_buf).or(env_path) {
            info!(path = %path.display(), "Loading synchronizer config");
            Self::load_from_file(&path)?
        } else {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.exists() {
                info!(path = %local.display(), "Loading synchronizer config");
                Self::load_from_file(local)?
            } else {
                info!("No config file found, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Does not apply env overrides or validate.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply `CANS_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored so a typo in one variable
    /// doesn't take the whole synchronizer down.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CANS_HOST") {
            self.server.host = host;
        }
        override_parsed(&lookup, "CANS_PORT", &mut self.server.port);
        override_parsed(&lookup, "CANS_HEARTBEAT_INTERVAL_MS", &mut self.heartbeat.interval_ms);
        override_parsed(&lookup, "CANS_HEARTBEAT_TIMEOUT_MS", &mut self.heartbeat.timeout_ms);
        override_parsed(&lookup, "CANS_SYNC_INTERVAL_MS", &mut self.sync.interval_ms);
        override_parsed(&lookup, "CANS_SYNC_TIMEOUT_MS", &mut self.sync.timeout_ms);
        override_parsed(&lookup, "CANS_MONITOR_INTERVAL_MS", &mut self.monitor.interval_ms);
        override_parsed(&lookup, "CANS_MONITOR_TIMEOUT_MS", &mut self.monitor.timeout_ms);
        override_parsed(&lookup, "CANS_MAX_LATENCY_MS", &mut self.monitor.max_latency_ms);
        override_parsed(
            &lookup,
            "CANS_CYCLE_CHECK_INTERVAL_MS",
            &mut self.alignment.check_interval_ms,
        );
        override_parsed(&lookup, "CANS_MAX_CYCLE_DRIFT", &mut self.alignment.max_cycle_drift);

        if let Some(list) = lookup("CANS_MODULES") {
            for (name, url) in parse_module_list(&list) {
                self.modules
                    .entry(name)
                    .and_modify(|m| m.base_url.clone_from(&url))
                    .or_insert_with(|| ModuleConfig::new(url));
            }
        }

        if let Some(list) = lookup("CANS_CRITICAL_MODULES") {
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                match self.modules.get_mut(name) {
                    Some(module) => module.critical = true,
                    None => warn!(module = name, "CANS_CRITICAL_MODULES names an unconfigured module"),
                }
            }
        }
    }

    /// Check every field, collecting all problems instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let intervals = [
            ("heartbeat.interval_ms", self.heartbeat.interval_ms),
            ("heartbeat.timeout_ms", self.heartbeat.timeout_ms),
            ("sync.interval_ms", self.sync.interval_ms),
            ("sync.timeout_ms", self.sync.timeout_ms),
            ("monitor.interval_ms", self.monitor.interval_ms),
            ("monitor.timeout_ms", self.monitor.timeout_ms),
            ("monitor.max_latency_ms", self.monitor.max_latency_ms),
            ("alignment.check_interval_ms", self.alignment.check_interval_ms),
        ];
        for (key, value) in intervals {
            if value == 0 {
                errors.push(format!("{key} must be greater than zero"));
            }
        }

        if self.alignment.max_cycle_drift == 0 {
            errors.push("alignment.max_cycle_drift must be greater than zero".to_string());
        }

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }

        for (name, module) in &self.modules {
            if name.trim().is_empty() {
                errors.push("module names must not be empty".to_string());
            }
            if !(module.base_url.starts_with("http://") || module.base_url.starts_with("https://")) {
                errors.push(format!(
                    "modules.{name}.base_url must start with http:// or https:// (got '{}')",
                    module.base_url
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Resolved endpoints for every configured module, in name order.
    pub fn endpoints(&self) -> Vec<ModuleEndpoint> {
        self.modules
            .iter()
            .map(|(name, m)| ModuleEndpoint {
                name: name.clone(),
                base_url: m.base_url.clone(),
                health_path: m.health_path.clone(),
                sync_path: m.sync_path.clone(),
                critical: m.critical,
                expected_response: Duration::from_millis(m.expected_response_ms),
            })
            .collect()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat.interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat.timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync.interval_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms)
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor.timeout_ms)
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.monitor.max_latency_ms)
    }

    pub fn cycle_check_interval(&self) -> Duration {
        Duration::from_millis(self.alignment.check_interval_ms)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring invalid config override"),
        }
    }
}

/// Parse `name=url,name=url` into pairs. Malformed entries are skipped.
pub fn parse_module_list(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Some((name.trim().to_string(), url.trim().to_string()))
            }
            _ => {
                warn!(entry, "Skipping malformed CANS_MODULES entry (expected name=url)");
                None
            }
        })
        .collect()
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config parse error ({}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = CansConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.monitor_interval(), Duration::from_secs(2));
        assert_eq!(config.monitor_timeout(), Duration::from_secs(3));
        assert_eq!(config.sync_interval(), Duration::from_millis(500));
        assert_eq!(config.sync_timeout(), Duration::from_secs(1));
        assert_eq!(config.cycle_check_interval(), Duration::from_millis(100));
        assert_eq!(config.alignment.max_cycle_drift, 5);
        assert!(config.modules.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_scalars_and_modules() {
        let mut config = CansConfig::default();
        config.apply_env_overrides_with(lookup_from(&[
            ("CANS_PORT", "9100"),
            ("CANS_MAX_CYCLE_DRIFT", "8"),
            ("CANS_MODULES", "cortex=http://localhost:7001, memory=http://localhost:7002"),
            ("CANS_CRITICAL_MODULES", "cortex"),
        ]));

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.alignment.max_cycle_drift, 8);
        assert_eq!(config.modules.len(), 2);
        assert!(config.modules["cortex"].critical);
        assert!(!config.modules["memory"].critical);
        assert_eq!(config.modules["memory"].health_path, "/health");
    }

    #[test]
    fn invalid_override_is_ignored() {
        let mut config = CansConfig::default();
        config.apply_env_overrides_with(lookup_from(&[("CANS_SYNC_INTERVAL_MS", "fast")]));
        assert_eq!(config.sync.interval_ms, defaults::SYNC_INTERVAL_MS);
    }

    #[test]
    fn malformed_module_entries_are_skipped() {
        let parsed = parse_module_list("a=http://x, broken, =http://y, b=");
        assert_eq!(parsed, vec![("a".to_string(), "http://x".to_string())]);
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = CansConfig::default();
        config.sync.interval_ms = 0;
        config.alignment.max_cycle_drift = 0;
        config
            .modules
            .insert("bad".to_string(), ModuleConfig::new("localhost:9000"));

        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn endpoint_urls_join_cleanly() {
        let mut config = CansConfig::default();
        let mut module = ModuleConfig::new("http://localhost:7001/");
        module.sync_path = "cycle/ack".to_string();
        config.modules.insert("cortex".to_string(), module);

        let endpoint = &config.endpoints()[0];
        assert_eq!(endpoint.health_url(), "http://localhost:7001/health");
        assert_eq!(endpoint.sync_url(), "http://localhost:7001/cycle/ack");
    }
}
