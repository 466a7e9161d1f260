//! Session coordinator: resolve a display, launch the server, verify it, publish it.
//!
//! The coordinator runs one session at a time through
//! `Idle -> Resolving -> Launching -> Verifying -> Running -> Stopping -> Idle`.
//! Any failure after a lock file or process was acquired releases them before
//! the error that caused the failure is returned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::shutdown;
use crate::config::{PublishConfig, XvfbConfig};
use crate::display::DisplayNumber;
use crate::process::{self, ExitOutcome, LaunchSpec, SupervisedProcess};
use crate::publish::{EnvOverlay, PublishedProperties, DISPLAY_ENV_VAR};
use crate::readiness;
use crate::reservation::{self, LockFile};
use crate::{AppError, Result};

/// Lifecycle phase of the coordinator's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    Idle,
    /// Choosing a display.
    Resolving,
    /// Starting the server.
    Launching,
    /// Waiting for the server to answer the probe.
    Verifying,
    /// Server up and published.
    Running,
    /// Server being torn down.
    Stopping,
}

/// Server and lock owned by a running session.
#[derive(Debug)]
pub struct ActiveSession {
    /// The running server.
    pub process: SupervisedProcess,
    /// Lock file, present when the display came from a search.
    pub lock: Option<LockFile>,
    /// Deadline for the server to exit on teardown.
    pub destroy_timeout: Duration,
    /// What was published for this server, withdrawn on teardown.
    pub publication: Publication,
}

/// Values a running session published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publication {
    /// Property key set to the display, if any.
    pub property: Option<String>,
    /// Whether `DISPLAY` was added to the environment overlay.
    pub env_var: bool,
}

/// Session state shared between the coordinator and its emergency finalizer.
#[derive(Debug)]
pub struct SessionSlot {
    state: SessionState,
    active: Option<ActiveSession>,
    properties: PublishedProperties,
    overlay: EnvOverlay,
}

impl SessionSlot {
    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }

    fn publish(&mut self, config: &PublishConfig, display_number: DisplayNumber) -> Publication {
        let value = display_number.to_string();
        let mut publication = Publication::default();
        if config.set_property {
            self.properties.set(config.property_name.clone(), value.clone());
            publication.property = Some(config.property_name.clone());
        }
        if config.set_env_var {
            info!(var = DISPLAY_ENV_VAR, %value, "overlaying display for later processes");
            self.overlay.set(DISPLAY_ENV_VAR, value);
            publication.env_var = true;
        }
        publication
    }

    fn withdraw(&mut self, publication: &Publication) {
        if let Some(key) = &publication.property {
            self.properties.remove(key);
        }
        if publication.env_var {
            debug!(var = DISPLAY_ENV_VAR, "removing display from overlay");
            self.overlay.remove(DISPLAY_ENV_VAR);
        }
    }
}

/// Shared handle to the session slot.
pub type SharedSlot = Arc<Mutex<SessionSlot>>;

/// Handle for a started session, passed back to [`SessionCoordinator::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    display: DisplayNumber,
    pid: Option<u32>,
    lock_path: Option<PathBuf>,
}

impl Session {
    /// Display the server is serving.
    #[must_use]
    pub fn display(&self) -> DisplayNumber {
        self.display
    }

    /// Server process id.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Lock file claiming the display, if it was searched for.
    #[must_use]
    pub fn lock_path(&self) -> Option<&std::path::Path> {
        self.lock_path.as_deref()
    }
}

/// Runs at most one display session and its teardown.
#[derive(Debug)]
pub struct SessionCoordinator {
    config: XvfbConfig,
    slot: SharedSlot,
    shutdown: CancellationToken,
    hook: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    /// Coordinator for `config`. Nothing is started until [`Self::start`].
    #[must_use]
    pub fn new(config: XvfbConfig) -> Self {
        Self {
            config,
            slot: Arc::new(Mutex::new(SessionSlot {
                state: SessionState::Idle,
                active: None,
                properties: PublishedProperties::default(),
                overlay: EnvOverlay::new(),
            })),
            shutdown: CancellationToken::new(),
            hook: None,
        }
    }

    /// Configuration this coordinator runs with.
    #[must_use]
    pub fn config(&self) -> &XvfbConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state
    }

    /// Values published by the running session; empty once it stopped.
    pub async fn properties(&self) -> PublishedProperties {
        self.slot.lock().await.properties.clone()
    }

    /// Environment overlay for processes spawned while the session runs.
    pub async fn env_overlay(&self) -> EnvOverlay {
        self.slot.lock().await.overlay.clone()
    }

    /// Token cancelled when emergency shutdown begins, by signal or by
    /// [`Self::request_shutdown`].
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Trigger the emergency finalizer as a termination signal would.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Start a session: resolve a display, launch the server, verify it and
    /// publish the display.
    ///
    /// The emergency finalizer is installed on the first call.
    ///
    /// # Errors
    ///
    /// - `AppError::ShuttingDown` once emergency shutdown has begun.
    /// - `AppError::SessionActive` if a session is already running.
    /// - `AppError::AlreadyInUse` if the fixed display is served already.
    /// - `AppError::RangeExhausted` / `AppError::NoRetryConfigured` from the search.
    /// - `AppError::SpawnFailed` if the server cannot be started.
    /// - `AppError::ReadinessTimeout` if the server never answered the probe.
    /// - `AppError::Config` for an invalid display or argument line.
    pub async fn start(&mut self) -> Result<Session> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::ShuttingDown(
                "emergency shutdown already ran; create a new coordinator".into(),
            ));
        }
        self.install_shutdown_hook();

        let shared = Arc::clone(&self.slot);
        let mut slot = shared.lock().await;
        if slot.state != SessionState::Idle {
            return Err(AppError::SessionActive(format!(
                "coordinator is {:?}; stop the current session first",
                slot.state
            )));
        }

        let span = info_span!("start_session");
        let result = self.run_start(&mut slot).instrument(span).await;
        if result.is_err() {
            slot.transition(SessionState::Idle);
        }
        result
    }

    async fn run_start(&self, slot: &mut SessionSlot) -> Result<Session> {
        let extra_args = self.config.extra_args()?;

        slot.transition(SessionState::Resolving);
        let (display_number, lock) = self.resolve_display().await?;

        slot.transition(SessionState::Launching);
        let spec = LaunchSpec {
            binary: self.config.xvfb_binary.clone(),
            display: display_number,
            extra_args,
            fbdir: self.config.fbdir.clone(),
            env_overlay: slot.overlay.clone(),
        };
        let server = match process::launch(&spec).await {
            Ok(server) => server,
            Err(err) => {
                if let Some(mut lock) = lock {
                    lock.release();
                }
                return Err(err);
            }
        };

        slot.transition(SessionState::Verifying);
        let probe = self.config.readiness_probe();
        if let Err(err) = readiness::wait_until_ready(display_number, &probe).await {
            warn!(%display_number, %err, "server failed its readiness check, tearing down");
            slot.transition(SessionState::Stopping);
            let outcome = process::stop(server, lock, self.config.destroy_timeout()).await;
            debug!(outcome = %outcome.describe(), "aborted server stopped");
            return Err(err);
        }

        let publication = slot.publish(&self.config.publish, display_number);

        let session = Session {
            display: display_number,
            pid: server.pid,
            lock_path: lock.as_ref().map(|lock| lock.path().to_path_buf()),
        };
        slot.active = Some(ActiveSession {
            process: server,
            lock,
            destroy_timeout: self.config.destroy_timeout(),
            publication,
        });
        slot.transition(SessionState::Running);
        info!(%display_number, "display session running");
        Ok(session)
    }

    /// Pick the fixed display after an activity check, or search for one.
    async fn resolve_display(&self) -> Result<(DisplayNumber, Option<LockFile>)> {
        if let Some(display_number) = self.config.fixed_display()? {
            if readiness::is_display_active(display_number, self.config.search.port_base).await {
                return Err(AppError::AlreadyInUse(format!(
                    "cannot start server: display {display_number} already in use"
                )));
            }
            info!(%display_number, "using configured display");
            return Ok((display_number, None));
        }

        let reserved = reservation::reserve(&self.config.port_search())?;
        let (display_number, lock) = reserved.release_socket();
        info!(%display_number, "launching server on searched display");
        Ok((display_number, Some(lock)))
    }

    /// Stop the session started as `session`.
    ///
    /// Returns `None` when no server was running, e.g. because the emergency
    /// finalizer already stopped it, or when `session` is not the one running.
    pub async fn stop(&mut self, session: Session) -> Option<ExitOutcome> {
        info!(
            display = %session.display,
            pid = session.pid.unwrap_or(0),
            "stopping display session"
        );
        teardown_slot(&self.slot, Some(&session)).await
    }

    /// Stop whatever server is running. Safe to call any number of times.
    pub async fn teardown(&self) -> Option<ExitOutcome> {
        teardown_slot(&self.slot, None).await
    }

    fn install_shutdown_hook(&mut self) {
        if self.hook.is_some() {
            return;
        }
        self.hook = Some(shutdown::install(
            Arc::clone(&self.slot),
            self.shutdown.clone(),
        ));
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook.abort();
        }
    }
}

/// Tear down the server held in `slot`, if any, withdraw what it published
/// and return to `Idle`.
///
/// With `expected` set, only the server that session started is stopped.
pub(crate) async fn teardown_slot(
    slot: &SharedSlot,
    expected: Option<&Session>,
) -> Option<ExitOutcome> {
    let mut slot = slot.lock().await;
    let Some(server) = slot.active.as_ref().map(|active| &active.process) else {
        debug!("no running server to stop");
        return None;
    };
    if let Some(session) = expected {
        if session.display != server.display || session.pid != server.pid {
            warn!(
                running = %server.display,
                running_pid = server.pid.unwrap_or(0),
                requested_pid = session.pid.unwrap_or(0),
                "session handle does not match the running server, ignoring"
            );
            return None;
        }
    }
    let active = slot.active.take()?;

    slot.transition(SessionState::Stopping);
    slot.withdraw(&active.publication);
    let outcome = process::stop(active.process, active.lock, active.destroy_timeout).await;
    slot.transition(SessionState::Idle);
    Some(outcome)
}
