//! Shared fixtures for integration tests: fake servers, probes, and ports.
//!
//! The fake server is `sh -c <script> sh`; the launcher appends the display,
//! so scripts see it as `$1`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use xvfb_session::XvfbConfig;

pub use crate::common::{lock_files, occupy_consecutive};

/// Server that exits on SIGTERM.
pub const SLEEPING_SERVER: &str = "exec sleep 30";

/// Server that exits with code 7 on SIGTERM.
pub const TRAPPING_SERVER: &str = "trap 'exit 7' TERM; while :; do sleep 0.05; done";

/// Server that ignores SIGTERM.
pub const STUBBORN_SERVER: &str = "trap '' TERM; while :; do sleep 0.05; done";

/// Display number the search range starts at.
pub const FIRST_DISPLAY: u16 = 20;

/// Config running `script` as the server with `true` as the probe.
///
/// The search covers `max_displays + 1` displays starting at `:20` on ports
/// starting at `first_port`.
pub fn session_config(script: &str, first_port: u16, max_displays: u16, lock_dir: &Path) -> XvfbConfig {
    let mut config = XvfbConfig::default();
    config.xvfb_binary = "sh".to_owned();
    config.xset_binary = "true".to_owned();
    config.args = vec!["-c".to_owned(), script.to_owned(), "sh".to_owned()];
    config.lock_dir = Some(lock_dir.to_path_buf());
    config.destroy_timeout_seconds = 5;
    config.search.port_base = first_port - FIRST_DISPLAY;
    config.search.first_display = FIRST_DISPLAY;
    config.search.max_displays = max_displays;
    config.readiness.attempts = 3;
    config.readiness.delay_ms = 10;
    config
}

/// Write an executable shell script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}

/// Probe that records each call in a counter file and succeeds from call
/// `succeed_on` onwards, or never when `None`.
pub fn counting_probe(dir: &Path, succeed_on: Option<u32>) -> (PathBuf, PathBuf) {
    let counter = dir.join("probe-count");
    let threshold = succeed_on.map_or_else(|| "999999".to_owned(), |n| n.to_string());
    let body = format!(
        "n=$(cat '{counter}' 2>/dev/null || echo 0)\nn=$((n + 1))\necho \"$n\" > '{counter}'\n[ \"$n\" -ge {threshold} ]",
        counter = counter.display(),
    );
    (write_script(dir, "probe.sh", &body), counter)
}

/// Number of probe calls recorded by [`counting_probe`].
pub fn probe_calls(counter: &Path) -> u32 {
    std::fs::read_to_string(counter)
        .map(|raw| raw.trim().parse().expect("counter is a number"))
        .unwrap_or(0)
}

/// Whether `pid` still names a live (or unreaped) process.
pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(i32::try_from(pid).expect("pid fits")), None).is_ok()
}

/// SIGKILL `pid`, ignoring errors.
pub fn force_kill(pid: u32) {
    let _ = kill(
        Pid::from_raw(i32::try_from(pid).expect("pid fits")),
        Signal::SIGKILL,
    );
}
