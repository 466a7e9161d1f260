//! Publication of the resolved display to later steps.
//!
//! Two channels exist: a string property store read by whatever runs after
//! the session started, and an environment overlay applied to processes the
//! host spawns afterwards. The host's own environment is never modified.

use std::collections::BTreeMap;

use tokio::process::Command;
use tracing::info;

/// Name of the environment variable X clients read.
pub const DISPLAY_ENV_VAR: &str = "DISPLAY";

/// Default property key the display is published under.
pub const DEFAULT_DISPLAY_PROPERTY: &str = "xvfb.display";

/// Key-value store of values published by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedProperties {
    values: BTreeMap<String, String>,
}

impl PublishedProperties {
    /// Set `key` to `value`, replacing any earlier value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        info!(%key, %value, "publishing property");
        self.values.insert(key, value);
    }

    /// Withdraw `key`, returning its last value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let value = self.values.remove(key);
        if value.is_some() {
            info!(%key, "withdrawing property");
        }
        value
    }

    /// Look up a published value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Iterate over all published entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Environment variables layered over the inherited environment of
/// subsequently spawned processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    /// Empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace a variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Drop `key` from the overlay.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// Current value for `key` in the overlay.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// True when no variables are overlaid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Add every overlaid variable to `cmd`.
    pub fn apply<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.envs(&self.vars)
    }
}
