//! Session configuration parsing, defaults, and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::display::DisplayNumber;
use crate::publish::DEFAULT_DISPLAY_PROPERTY;
use crate::readiness::ReadinessProbe;
use crate::reservation::PortSearch;
use crate::{AppError, Result};

/// Display search bounds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SearchConfig {
    /// Port of display `:0`.
    #[serde(default = "default_port_base")]
    pub port_base: u16,
    /// First display number tried, e.g. 20 for `:20`.
    #[serde(default = "default_first_display")]
    pub first_display: u16,
    /// How many further displays to try after the first.
    #[serde(default = "default_max_displays")]
    pub max_displays: u16,
    /// Keep searching when a port turns out to be bound.
    #[serde(default = "default_true")]
    pub retry_on_busy: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            port_base: default_port_base(),
            first_display: default_first_display(),
            max_displays: default_max_displays(),
            retry_on_busy: true,
        }
    }
}

/// Post-launch readiness polling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReadinessConfig {
    /// Whether to probe the server after launch.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum probe invocations.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Pause between probes, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Where the resolved display is published.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PublishConfig {
    /// Publish the display as a property.
    #[serde(default = "default_true")]
    pub set_property: bool,
    /// Property key used when publishing.
    #[serde(default = "default_property_name")]
    pub property_name: String,
    /// Overlay `DISPLAY` onto processes spawned afterwards.
    #[serde(default)]
    pub set_env_var: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            set_property: true,
            property_name: default_property_name(),
            set_env_var: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_port_base() -> u16 {
    6000
}

fn default_first_display() -> u16 {
    20
}

fn default_max_displays() -> u16 {
    20
}

fn default_attempts() -> u32 {
    10
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_property_name() -> String {
    DEFAULT_DISPLAY_PROPERTY.into()
}

fn default_xvfb_binary() -> String {
    "Xvfb".into()
}

fn default_xset_binary() -> String {
    "xset".into()
}

fn default_destroy_timeout_seconds() -> u64 {
    13
}

/// Configuration for one display session, usually read from `xvfb.toml`.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct XvfbConfig {
    /// Do nothing when starting.
    #[serde(default)]
    pub skip: bool,
    /// Server binary.
    #[serde(default = "default_xvfb_binary")]
    pub xvfb_binary: String,
    /// Readiness probe binary.
    #[serde(default = "default_xset_binary")]
    pub xset_binary: String,
    /// Fixed display such as `":20"`; disables the search.
    #[serde(default)]
    pub display: Option<String>,
    /// Seconds to wait for the server to exit after requesting termination.
    #[serde(default = "default_destroy_timeout_seconds")]
    pub destroy_timeout_seconds: u64,
    /// Framebuffer directory passed as `-fbdir`.
    #[serde(default)]
    pub fbdir: Option<PathBuf>,
    /// Extra server arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra server arguments as one shell-quoted line, appended after `args`.
    #[serde(default)]
    pub arg_line: Option<String>,
    /// Directory for lock files; defaults to the system temp dir.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
    /// Display search bounds.
    #[serde(default)]
    pub search: SearchConfig,
    /// Readiness polling.
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// Publication targets.
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Default for XvfbConfig {
    fn default() -> Self {
        Self {
            skip: false,
            xvfb_binary: default_xvfb_binary(),
            xset_binary: default_xset_binary(),
            display: None,
            destroy_timeout_seconds: default_destroy_timeout_seconds(),
            fbdir: None,
            args: Vec::new(),
            arg_line: None,
            lock_dir: None,
            search: SearchConfig::default(),
            readiness: ReadinessConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl XvfbConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured fixed display, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the value is not a display number.
    pub fn fixed_display(&self) -> Result<Option<DisplayNumber>> {
        self.display
            .as_deref()
            .map(str::parse::<DisplayNumber>)
            .transpose()
    }

    /// Server arguments: `args` followed by the tokenized `arg_line`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `arg_line` has unbalanced quoting.
    pub fn extra_args(&self) -> Result<Vec<String>> {
        let mut args = self.args.clone();
        if let Some(line) = &self.arg_line {
            let tokens = shell_words::split(line)
                .map_err(|err| AppError::Config(format!("invalid arg_line {line:?}: {err}")))?;
            args.extend(tokens);
        }
        Ok(args)
    }

    /// Directory lock files are written to.
    #[must_use]
    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Search parameters derived from this configuration.
    #[must_use]
    pub fn port_search(&self) -> PortSearch {
        PortSearch {
            base: self.search.port_base,
            first: self.search.first_display,
            max_search: self.search.max_displays,
            retry_on_busy: self.search.retry_on_busy,
            lock_dir: self.lock_dir(),
        }
    }

    /// Readiness probe; zero attempts when readiness checks are disabled.
    #[must_use]
    pub fn readiness_probe(&self) -> ReadinessProbe {
        ReadinessProbe {
            program: self.xset_binary.clone(),
            attempts: if self.readiness.enabled {
                self.readiness.attempts
            } else {
                0
            },
            delay: Duration::from_millis(self.readiness.delay_ms),
        }
    }

    /// Deadline for the server to exit on stop.
    #[must_use]
    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_secs(self.destroy_timeout_seconds)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.xvfb_binary.trim().is_empty() {
            return Err(AppError::Config("xvfb_binary must not be empty".into()));
        }

        if self.xset_binary.trim().is_empty() {
            return Err(AppError::Config("xset_binary must not be empty".into()));
        }

        if let Some(display) = self.fixed_display()? {
            if display.port(self.search.port_base).is_none() {
                return Err(AppError::Config(format!(
                    "display {display} is beyond the last port for base {}",
                    self.search.port_base
                )));
            }
        }

        let last = u32::from(self.search.port_base)
            + u32::from(self.search.first_display)
            + u32::from(self.search.max_displays);
        if last > u32::from(u16::MAX) {
            return Err(AppError::Config(format!(
                "search range ends at port {last}, beyond {}",
                u16::MAX
            )));
        }

        if self.publish.set_property && self.publish.property_name.trim().is_empty() {
            return Err(AppError::Config(
                "publish.property_name must not be empty".into(),
            ));
        }

        self.extra_args()?;
        Ok(())
    }
}
