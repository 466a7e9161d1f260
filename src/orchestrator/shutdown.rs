//! Emergency teardown when the host is asked to terminate.
//!
//! The finalizer is a background task that waits for SIGINT/SIGTERM (or an
//! explicit request through the coordinator's token) and then runs the same
//! idempotent teardown as a normal stop. Once a termination signal listener
//! is registered, tokio keeps it registered for the rest of the process, so
//! the host decides when to exit by watching the token.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use super::coordinator::{teardown_slot, SharedSlot};

/// Spawn the finalizer for `slot`.
///
/// `requested` is cancelled when a signal arrives, so the host can observe
/// it; cancelling it from elsewhere triggers the same teardown.
#[must_use]
pub fn install(slot: SharedSlot, requested: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            tokio::select! {
                () = shutdown_signal() => {
                    info!("termination signal received");
                    requested.cancel();
                }
                () = requested.cancelled() => {
                    info!("shutdown requested");
                }
            }

            match teardown_slot(&slot, None).await {
                Some(outcome) => info!(outcome = %outcome.describe(), "server stopped by finalizer"),
                None => info!("finalizer found no running server"),
            }
        }
        .instrument(info_span!("emergency_cleanup")),
    )
}

/// Resolve when the process receives Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}
