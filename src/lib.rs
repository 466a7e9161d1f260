#![forbid(unsafe_code)]

//! Reserve a free X display, run `Xvfb` on it, and tear it down cleanly.
//!
//! Concurrent invocations on one host coordinate through advisory lock files
//! in a shared directory. A [`SessionCoordinator`] owns the whole lifecycle:
//! display search or fixed-display check, server launch, readiness polling,
//! publication of the display, and bounded-wait shutdown.

pub mod cli;
pub mod config;
pub mod display;
pub mod errors;
pub mod orchestrator;
pub mod process;
pub mod publish;
pub mod readiness;
pub mod reservation;

pub use config::XvfbConfig;
pub use display::DisplayNumber;
pub use errors::{AppError, Result};
pub use orchestrator::{Session, SessionCoordinator, SessionState};
pub use process::ExitOutcome;
