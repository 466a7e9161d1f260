//! Server process launch and supervised shutdown.

pub mod launcher;
pub mod supervisor;

pub use launcher::{launch, LaunchSpec, SupervisedProcess};
pub use supervisor::{stop, ExitOutcome};
