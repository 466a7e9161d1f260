//! Integration tests for bounded-wait server shutdown.

use std::time::{Duration, Instant};

use serial_test::serial;

use xvfb_session::process::{launch, stop, LaunchSpec};
use xvfb_session::publish::EnvOverlay;
use xvfb_session::reservation::{lock_path, Claim, LockFile};
use xvfb_session::{DisplayNumber, ExitOutcome};

use super::test_helpers::{force_kill, pid_alive, SLEEPING_SERVER, STUBBORN_SERVER, TRAPPING_SERVER};

fn fake_server(script: &str) -> LaunchSpec {
    LaunchSpec {
        binary: "sh".to_owned(),
        display: DisplayNumber::new(31),
        extra_args: vec!["-c".to_owned(), script.to_owned(), "sh".to_owned()],
        fbdir: None,
        env_overlay: EnvOverlay::new(),
    }
}

fn claim(dir: &std::path::Path, port: u16) -> LockFile {
    match LockFile::create(lock_path(dir, port)).expect("create lock") {
        Claim::Acquired(lock) => lock,
        Claim::Contended => panic!("fresh directory cannot be contended"),
    }
}

/// Give a trapping shell time to install its handler before it is signalled.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
#[serial]
async fn stop_reports_the_exit_code_and_releases_the_lock() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lock = claim(dir.path(), 6031);
    let lock_file = lock.path().to_path_buf();
    let server = launch(&fake_server(TRAPPING_SERVER)).await.expect("launch");
    let pid = server.pid.expect("pid");
    settle().await;

    let outcome = stop(server, Some(lock), Duration::from_secs(5)).await;

    assert_eq!(outcome.code(), Some(7));
    assert_eq!(outcome.describe(), "exited with code 7");
    assert!(!lock_file.exists());
    assert!(!pid_alive(pid), "server is reaped");
}

#[tokio::test]
#[serial]
async fn signalled_exit_has_no_code() {
    let server = launch(&fake_server(SLEEPING_SERVER)).await.expect("launch");
    settle().await;

    let outcome = stop(server, None, Duration::from_secs(5)).await;

    assert!(matches!(outcome, ExitOutcome::Exited(_)), "got {outcome:?}");
    assert_eq!(outcome.code(), None);
    assert_eq!(outcome.describe(), "terminated by signal");
}

#[tokio::test]
#[serial]
async fn unresponsive_server_is_unknown_after_the_deadline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lock = claim(dir.path(), 6032);
    let lock_file = lock.path().to_path_buf();
    let server = launch(&fake_server(STUBBORN_SERVER)).await.expect("launch");
    let pid = server.pid.expect("pid");
    settle().await;

    let started = Instant::now();
    let outcome = stop(server, Some(lock), Duration::from_millis(300)).await;
    let waited = started.elapsed();

    assert_eq!(outcome, ExitOutcome::Unknown);
    assert_eq!(outcome.describe(), "unknown exit code");
    assert!(waited >= Duration::from_millis(300), "waited {waited:?}");
    assert!(waited < Duration::from_secs(5), "waited {waited:?}");
    assert!(!lock_file.exists(), "lock is released even without an exit");
    assert!(pid_alive(pid), "server ignored SIGTERM");

    force_kill(pid);
}
