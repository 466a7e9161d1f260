//! Command-line interface of the `xvfb-session` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Log filter used when `RUST_LOG` is unset: this crate at info, the rest
/// at warn.
pub const DEFAULT_LOG_FILTER: &str = "warn,xvfb_session=info";

/// Log output format.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level arguments.
#[derive(Debug, Parser)]
#[command(name = "xvfb-session", about = "Run commands against a private Xvfb display", version, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start Xvfb, run a command with `DISPLAY` set, then stop Xvfb.
    Run {
        /// Use this display instead of searching for a free one.
        #[arg(long)]
        display: Option<String>,

        /// Command and arguments to run.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Probe a display once with the configured probe binary.
    Probe {
        /// Display to probe, e.g. `:20`.
        display: String,
    },

    /// Reserve a display from the search range, print it, and release it.
    Reserve,
}
