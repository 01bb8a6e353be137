//! Background services: heartbeat, module monitor, sync beacon, cycle aligner
//!
//! Each service runs as its own periodic loop on its own cadence. They never
//! call each other; all coordination goes through the shared state store.
//! A failing or panicking iteration is logged and the loop carries on after
//! its normal interval. Cancellation is checked between iterations, so an
//! iteration in progress always completes.

pub mod aligner;
pub mod beacon;
pub mod heartbeat;
pub mod monitor;

pub use aligner::{AlignmentAction, AlignmentReport, CycleAligner, Misalignment};
pub use beacon::{BeaconRound, SyncBeaconService};
pub use heartbeat::HeartbeatEmitter;
pub use monitor::{ModuleMonitor, MonitorReport};

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Drive `iteration` every `interval` until `cancel` fires.
///
/// Returns the number of iterations run.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    mut iteration: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    info!(interval_ms = interval.as_millis() as u64, "[{}] Loop started", name);
    let mut iterations = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match AssertUnwindSafe(iteration()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "[{}] Iteration failed, retrying next interval", name);
            }
            Err(panic) => {
                error!(
                    panic = panic_message(panic.as_ref()),
                    "[{}] Iteration panicked, retrying next interval", name
                );
            }
        }
        iterations += 1;

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    info!(iterations, "[{}] Loop stopped", name);
    iterations
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
