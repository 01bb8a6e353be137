//! System-wide default constants.
//!
//! Every interval and threshold the loops fall back to when nothing is
//! configured. Grouped by subsystem for easy discovery.

// ============================================================================
// Transport Layer
// ============================================================================

/// Default bind host for the HTTP API.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port for the HTTP API.
pub const DEFAULT_PORT: u16 = 8090;

// ============================================================================
// Heartbeat Emitter
// ============================================================================

/// Interval between liveness pulses (milliseconds).
pub const HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Timeout applied to a single heartbeat tick (milliseconds).
pub const HEARTBEAT_TIMEOUT_MS: u64 = 500;

// ============================================================================
// Synchronization Beacon
// ============================================================================

/// Interval between beacon rounds (milliseconds).
pub const SYNC_INTERVAL_MS: u64 = 500;

/// Per-module timeout for a beacon send (milliseconds).
pub const SYNC_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// Module Monitor
// ============================================================================

/// Interval between monitoring cycles (milliseconds).
pub const MONITOR_INTERVAL_MS: u64 = 2_000;

/// Per-module health check timeout (milliseconds).
pub const MONITOR_TIMEOUT_MS: u64 = 3_000;

/// Round-trip latency above which a high-latency warning is emitted (milliseconds).
pub const MAX_LATENCY_MS: u64 = 1_000;

// ============================================================================
// Cycle Aligner
// ============================================================================

/// Interval between alignment passes (milliseconds).
pub const CYCLE_CHECK_INTERVAL_MS: u64 = 100;

/// Maximum tolerated distance between a module's cycle and the master cycle.
pub const MAX_CYCLE_DRIFT: u64 = 5;

// ============================================================================
// Monitored Modules
// ============================================================================

/// Default health endpoint path on a monitored module.
pub const MODULE_HEALTH_PATH: &str = "/health";

/// Default synchronization endpoint path on a monitored module.
pub const MODULE_SYNC_PATH: &str = "/sync";

/// Default expected response time for a monitored module (milliseconds).
pub const MODULE_EXPECTED_RESPONSE_MS: u64 = 500;

// ============================================================================
// Supervisor
// ============================================================================

/// How long shutdown waits for the loops to drain before aborting them (seconds).
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Upper bound on the HTTP client's own request timeout (seconds).
///
/// The services enforce their tighter per-call timeouts on top of this.
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 10;
