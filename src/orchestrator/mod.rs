//! Session orchestration.
//!
//! Covers the session state machine, display publication, and the
//! emergency finalizer that stops the server on host termination.

pub mod coordinator;
pub mod shutdown;

pub use coordinator::{ActiveSession, Publication, Session, SessionCoordinator, SessionState};
