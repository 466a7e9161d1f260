//! Xvfb process launcher.
//!
//! Builds the server command line and spawns it as a child of the host.
//! Standard streams are inherited; nothing is captured.

use std::path::PathBuf;

use tokio::process::{Child, Command};
use tracing::{info, info_span, Instrument};

use crate::display::DisplayNumber;
use crate::publish::EnvOverlay;
use crate::{AppError, Result};

/// Everything needed to start one server process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Server binary, resolved through `PATH` when not absolute.
    pub binary: String,
    /// Display the server should serve.
    pub display: DisplayNumber,
    /// Arguments placed between the binary and the display.
    pub extra_args: Vec<String>,
    /// Directory for memory-mapped framebuffers (`-fbdir`).
    pub fbdir: Option<PathBuf>,
    /// Variables layered over the inherited environment.
    pub env_overlay: EnvOverlay,
}

impl LaunchSpec {
    /// Full argument vector, binary first.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.extra_args.len() + 4);
        argv.push(self.binary.clone());
        argv.extend(self.extra_args.iter().cloned());
        if let Some(dir) = &self.fbdir {
            argv.push("-fbdir".to_owned());
            argv.push(dir.display().to_string());
        }
        argv.push(self.display.to_string());
        argv
    }
}

/// A running server owned by the session that launched it.
#[derive(Debug)]
pub struct SupervisedProcess {
    /// Display the process serves.
    pub display: DisplayNumber,
    /// Command line the process was started with.
    pub argv: Vec<String>,
    /// OS process id, if the process had not been reaped at spawn time.
    pub pid: Option<u32>,
    pub(crate) child: Child,
}

impl SupervisedProcess {
    /// Exit status if the process has already exited, without blocking.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the process status cannot be queried.
    pub fn try_exit_status(&mut self) -> Result<Option<std::process::ExitStatus>> {
        Ok(self.child.try_wait()?)
    }
}

/// Spawn the server described by `spec`.
///
/// The framebuffer directory is created first when configured and missing.
///
/// # Errors
///
/// - `AppError::Io` if the framebuffer directory cannot be created.
/// - `AppError::SpawnFailed` if the OS refuses to start the binary.
pub async fn launch(spec: &LaunchSpec) -> Result<SupervisedProcess> {
    let span = info_span!("launch_server", display = %spec.display, binary = %spec.binary);

    async move {
        if let Some(dir) = &spec.fbdir {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await.map_err(|err| {
                    AppError::Io(format!("failed to create fbdir {}: {err}", dir.display()))
                })?;
            }
        }

        let argv = spec.argv();
        info!(?argv, "attempting to launch server");

        let mut cmd = Command::new(&spec.binary);
        cmd.args(&argv[1..]).kill_on_drop(true);
        spec.env_overlay.apply(&mut cmd);

        let child = cmd.spawn().map_err(|err| {
            AppError::SpawnFailed(format!("failed to launch {}: {err}", spec.binary))
        })?;

        let pid = child.id();
        info!(pid = pid.unwrap_or(0), "server launched");

        Ok(SupervisedProcess {
            display: spec.display,
            argv,
            pid,
            child,
        })
    }
    .instrument(span)
    .await
}
