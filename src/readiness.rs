//! Display readiness and activity probes.
//!
//! Readiness polls an external probe (`xset -display :N q` by default) until
//! it exits successfully. Activity is a single TCP connect to the display
//! port and decides whether a fixed display is already taken.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, info_span, Instrument};

use crate::display::DisplayNumber;
use crate::{AppError, Result};

/// Upper bound on a single activity connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Probe configuration for [`wait_until_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbe {
    /// Probe binary, invoked as `<program> -display :N q`.
    pub program: String,
    /// Total probe invocations allowed; zero disables the check.
    pub attempts: u32,
    /// Fixed pause between failed probes.
    pub delay: Duration,
}

/// Run the probe once against `display_number`.
///
/// # Errors
///
/// Returns `AppError::SpawnFailed` if the probe binary cannot be run.
pub async fn probe_display(program: &str, display_number: DisplayNumber) -> Result<bool> {
    let status = Command::new(program)
        .arg("-display")
        .arg(display_number.to_string())
        .arg("q")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|err| {
            AppError::SpawnFailed(format!(
                "failed to check if display {display_number} is active with {program}: {err}"
            ))
        })?;
    Ok(status.success())
}

/// Poll the probe until the display answers or attempts run out.
///
/// # Errors
///
/// - `AppError::ReadinessTimeout` if every attempt failed.
/// - `AppError::SpawnFailed` if the probe binary cannot be run.
pub async fn wait_until_ready(display_number: DisplayNumber, probe: &ReadinessProbe) -> Result<()> {
    if probe.attempts == 0 {
        return Ok(());
    }

    let span = info_span!("wait_until_ready", %display_number, attempts = probe.attempts);
    async move {
        info!("waiting for server to become active");
        let mut remaining = probe.attempts;
        while !probe_display(&probe.program, display_number).await? {
            remaining -= 1;
            debug!(remaining, "active check failed");
            if remaining == 0 {
                return Err(AppError::ReadinessTimeout(format!(
                    "active check failed for display {display_number} after {} attempts",
                    probe.attempts
                )));
            }
            tokio::time::sleep(probe.delay).await;
        }
        info!("server is active");
        Ok(())
    }
    .instrument(span)
    .await
}

/// Whether something accepts connections on the display's port.
///
/// One attempt only; refusal, timeout or any other error means inactive.
pub async fn is_display_active(display_number: DisplayNumber, base: u16) -> bool {
    let Some(port) = display_number.port(base) else {
        return false;
    };

    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((Ipv4Addr::LOCALHOST, port)))
        .await
    {
        Ok(Ok(_stream)) => {
            debug!(%display_number, port, "display is active");
            true
        }
        Ok(Err(err)) => {
            debug!(%display_number, port, %err, "display is not active");
            false
        }
        Err(_elapsed) => {
            debug!(%display_number, port, "activity check timed out");
            false
        }
    }
}
