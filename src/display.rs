//! X display identifiers.
//!
//! A display is a small number rendered as `:N`. The server listening on it
//! binds TCP port `base + N`, where `base` is conventionally 6000.

use std::fmt::{Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::AppError;

/// An X display number, e.g. `:20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayNumber(u16);

impl DisplayNumber {
    /// Wrap a raw display number.
    #[must_use]
    pub const fn new(number: u16) -> Self {
        Self(number)
    }

    /// The raw display number.
    #[must_use]
    pub const fn number(self) -> u16 {
        self.0
    }

    /// TCP port served by this display, or `None` if `base + N` overflows.
    #[must_use]
    pub fn port(self, base: u16) -> Option<u16> {
        base.checked_add(self.0)
    }
}

impl std::fmt::Display for DisplayNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, ":{}", self.0)
    }
}

impl FromStr for DisplayNumber {
    type Err = AppError;

    /// Accepts `:N` and bare `N`. A screen suffix (`:N.S`) is not a display.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix(':').unwrap_or(trimmed);
        digits
            .parse::<u16>()
            .map(Self)
            .map_err(|err| AppError::Config(format!("invalid display {raw:?}: {err}")))
    }
}
