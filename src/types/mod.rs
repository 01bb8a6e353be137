//! Shared data structures for the synchronizer core
//!
//! - ModuleStatus / ModuleState / SyncStatus: per-module record
//! - SyncPulse / SyncBeacon / SyncAck: beacon round records and payloads
//! - Heartbeat / SystemCounters / SystemSnapshot: process-wide aggregates
//! - Alert: derived, severity-tagged alerts

mod module;
mod sync;
mod system;
mod alert;

pub use module::*;
pub use sync::*;
pub use system::*;
pub use alert::*;
