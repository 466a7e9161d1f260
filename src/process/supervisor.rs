//! Bounded-wait shutdown of a supervised server.
//!
//! The server is asked to terminate, then reaped by a dedicated task which
//! the caller joins with a deadline. A server that ignores the request is
//! left running and reported as [`ExitOutcome::Unknown`]; the lock file is
//! released either way.

use std::process::ExitStatus;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use super::launcher::SupervisedProcess;
use crate::reservation::LockFile;

/// Result of stopping a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The server exited within the deadline.
    Exited(ExitStatus),
    /// The exit could not be confirmed before the deadline.
    Unknown,
}

impl ExitOutcome {
    /// Exit code when the server exited normally.
    #[must_use]
    pub fn code(self) -> Option<i32> {
        match self {
            Self::Exited(status) => status.code(),
            Self::Unknown => None,
        }
    }

    /// Human-readable summary for logs.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::Exited(status) => status.code().map_or_else(
                || "terminated by signal".to_owned(),
                |code| format!("exited with code {code}"),
            ),
            Self::Unknown => "unknown exit code".to_owned(),
        }
    }
}

/// Ask `process` to terminate, wait up to `timeout` for it, then release
/// `lock`.
///
/// Never fails: an unconfirmed exit is [`ExitOutcome::Unknown`] and lock
/// deletion problems are logged.
pub async fn stop(
    process: SupervisedProcess,
    lock: Option<LockFile>,
    timeout: Duration,
) -> ExitOutcome {
    let span = info_span!("stop_server", display = %process.display, pid = process.pid.unwrap_or(0));

    async move {
        let SupervisedProcess { mut child, .. } = process;

        debug!("shutting down server");
        request_termination(&mut child);

        let waiter = tokio::spawn(async move { child.wait().await });
        let outcome = match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(Ok(status))) => ExitOutcome::Exited(status),
            Ok(Ok(Err(err))) => {
                warn!(%err, "failed to wait for server exit");
                ExitOutcome::Unknown
            }
            Ok(Err(err)) => {
                warn!(%err, "server wait task failed");
                ExitOutcome::Unknown
            }
            Err(_elapsed) => {
                warn!(?timeout, "server did not exit before the deadline");
                ExitOutcome::Unknown
            }
        };
        info!(outcome = %outcome.describe(), "server shut down");

        if let Some(mut lock) = lock {
            debug!(path = %lock.path().display(), "deleting lock file");
            lock.release();
        }

        outcome
    }
    .instrument(span)
    .await
}

#[cfg(unix)]
fn request_termination(child: &mut tokio::process::Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `id()` is `None` once reaped, so a recycled pid is never signalled.
    let Some(pid) = child.id() else {
        debug!("server already reaped, nothing to signal");
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range, cannot signal server");
        return;
    };

    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, %err, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut tokio::process::Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "failed to request server termination");
    }
}
