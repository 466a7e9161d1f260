//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure modes of a display session.
///
/// Every variant aborts the session it occurs in. An unconfirmed exit code
/// on shutdown is not an error; see [`crate::process::ExitOutcome::Unknown`].
#[derive(Debug)]
pub enum AppError {
    /// The configured fixed display is already served by something else.
    AlreadyInUse(String),
    /// No free display was found within the search bounds.
    RangeExhausted(String),
    /// A bind failed and retrying on busy ports is disabled.
    NoRetryConfigured(String),
    /// The operating system could not start a process.
    SpawnFailed(String),
    /// The server never answered the readiness probe.
    ReadinessTimeout(String),
    /// The coordinator already has a running session.
    SessionActive(String),
    /// Emergency shutdown has begun; no new session may start.
    ShuttingDown(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInUse(msg) => write!(f, "already in use: {msg}"),
            Self::RangeExhausted(msg) => write!(f, "range exhausted: {msg}"),
            Self::NoRetryConfigured(msg) => write!(f, "no retry configured: {msg}"),
            Self::SpawnFailed(msg) => write!(f, "spawn failed: {msg}"),
            Self::ReadinessTimeout(msg) => write!(f, "readiness timeout: {msg}"),
            Self::SessionActive(msg) => write!(f, "session active: {msg}"),
            Self::ShuttingDown(msg) => write!(f, "shutting down: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
