//! Free display search and reservation.
//!
//! Walks the configured display range, skipping ports another search has
//! already claimed via a lock file, and proves each candidate free by binding
//! a throwaway listener. The first bindable port gets a lock file and is
//! handed back together with the still-open listener.
//!
//! The lock is advisory. Between dropping the listener and the server binding
//! the port, an unrelated program may still take it; `retry_on_busy` only
//! narrows the window for sibling searches.

pub mod lockfile;

use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;

use tracing::{debug, info, info_span};

use crate::display::DisplayNumber;
use crate::{AppError, Result};

pub use lockfile::{lock_path, Claim, LockFile, LOCK_FILE_PREFIX};

/// Bounds and policy for a display search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSearch {
    /// Port of display `:0`.
    pub base: u16,
    /// First display number to try.
    pub first: u16,
    /// Number of displays to try after `first` (the range is inclusive).
    pub max_search: u16,
    /// Keep searching when a port cannot be bound.
    pub retry_on_busy: bool,
    /// Directory holding lock files shared with sibling searches.
    pub lock_dir: PathBuf,
}

/// A display proven free at reservation time.
#[derive(Debug)]
pub struct ReservedDisplay {
    /// The reserved display.
    pub display: DisplayNumber,
    /// Port backing the display.
    pub port: u16,
    /// Placeholder listener; close it before starting the server.
    pub listener: TcpListener,
    /// Lock file claiming the port.
    pub lock: LockFile,
}

impl ReservedDisplay {
    /// Close the placeholder socket and keep the display and its lock.
    #[must_use]
    pub fn release_socket(self) -> (DisplayNumber, LockFile) {
        drop(self.listener);
        (self.display, self.lock)
    }
}

/// Find and claim the first free display in the search range.
///
/// # Errors
///
/// - `AppError::NoRetryConfigured` if a bind fails and `retry_on_busy` is off.
/// - `AppError::RangeExhausted` if no display in range could be claimed.
/// - `AppError::Io` if a lock file cannot be created for a reason other than
///   it already existing.
pub fn reserve(search: &PortSearch) -> Result<ReservedDisplay> {
    let span = info_span!(
        "reserve_display",
        base = search.base,
        first = search.first,
        max = search.max_search
    );
    let _guard = span.enter();

    let last = u32::from(search.first) + u32::from(search.max_search);
    for n in u32::from(search.first)..=last {
        let Some(display_number) = u16::try_from(n).ok().map(DisplayNumber::new) else {
            break;
        };
        let Some(port) = display_number.port(search.base) else {
            debug!(%display_number, "display port out of range, stopping search");
            break;
        };

        let path = lock_path(&search.lock_dir, port);
        if path.exists() {
            debug!(
                %display_number,
                path = %path.display(),
                "display claimed by lock file, skipping"
            );
            continue;
        }

        debug!(%display_number, port, "trying to reserve display");
        let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(listener) => listener,
            Err(err) if search.retry_on_busy => {
                debug!(%display_number, port, %err, "port busy, trying next display");
                continue;
            }
            Err(err) => {
                return Err(AppError::NoRetryConfigured(format!(
                    "could not bind display {display_number} (port {port}) and retry_on_busy is false: {err}"
                )));
            }
        };

        match LockFile::create(path) {
            Ok(Claim::Acquired(lock)) => {
                info!(%display_number, port, lock = %lock.path().display(), "display reserved");
                return Ok(ReservedDisplay {
                    display: display_number,
                    port,
                    listener,
                    lock,
                });
            }
            Ok(Claim::Contended) => {
                debug!(%display_number, port, "lock file appeared concurrently, skipping");
            }
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to create lock file for display {display_number}: {err}"
                )));
            }
        }
    }

    Err(AppError::RangeExhausted(format!(
        "no usable display between :{} and :{last}",
        search.first
    )))
}
