//! CANS: Cognitive Autonomous Neural Synchronizer
//!
//! Keeps a fleet of independently deployed cognitive modules on a common
//! logical clock and isolates members that fail or drift.
//!
//! ## Architecture
//!
//! - **Shared State Store** ([`state`]): every module's status, the master
//!   cycle and aggregate counters, behind one lock
//! - **Heartbeat Emitter**: periodic liveness pulse with aggregate health
//! - **Module Monitor**: concurrent health checks feeding the failure policy
//! - **Synchronization Beacon**: broadcasts the next cycle, collects acks and
//!   is the only component that advances the master cycle
//! - **Cycle Aligner**: isolates or realigns modules that drift between rounds
//!
//! The four services never call each other; they coordinate only through
//! the store. [`supervisor::Synchronizer`] wires them together.

pub mod alerts;
pub mod api;
pub mod background;
pub mod config;
pub mod state;
pub mod supervisor;
pub mod transport;
pub mod types;

// Re-export configuration
pub use config::{CansConfig, ConfigError, ModuleConfig, ModuleEndpoint};

// Re-export commonly used types
pub use types::{
    Alert, AlertKind, AlertSeverity, Heartbeat, ModuleState, ModuleStatus, SyncAck, SyncBeacon,
    SyncPulse, SyncStatus, SyncSummary, SystemCounters, SystemSnapshot,
};

// Re-export the store, services and transport seam
pub use background::{CycleAligner, HeartbeatEmitter, ModuleMonitor, SyncBeaconService};
pub use state::SharedState;
pub use supervisor::{Synchronizer, TaskName};
pub use transport::{HealthProbe, HttpTransport, ModuleTransport, TransportError};
