//! Unit tests for configuration parsing, defaults, and validation.

use std::time::Duration;

use xvfb_session::{AppError, DisplayNumber, XvfbConfig};

#[test]
fn empty_config_uses_defaults() {
    let config = XvfbConfig::from_toml_str("").expect("empty config is valid");

    assert!(!config.skip);
    assert_eq!(config.xvfb_binary, "Xvfb");
    assert_eq!(config.xset_binary, "xset");
    assert_eq!(config.display, None);
    assert_eq!(config.search.port_base, 6000);
    assert_eq!(config.search.first_display, 20);
    assert_eq!(config.search.max_displays, 20);
    assert!(config.search.retry_on_busy);
    assert!(config.readiness.enabled);
    assert_eq!(config.readiness.attempts, 10);
    assert_eq!(config.readiness.delay_ms, 1000);
    assert!(config.publish.set_property);
    assert_eq!(config.publish.property_name, "xvfb.display");
    assert!(!config.publish.set_env_var);
    assert_eq!(config.destroy_timeout(), Duration::from_secs(13));
    assert_eq!(config, XvfbConfig::default());
}

#[test]
fn full_config_parses() {
    let toml = r#"
xvfb_binary = "/usr/bin/Xvfb"
xset_binary = "/usr/bin/xset"
display = ":42"
destroy_timeout_seconds = 3
fbdir = "/tmp/fb"
args = ["-screen", "0", "1280x1024x24"]
arg_line = "-nolisten tcp"
lock_dir = "/tmp/locks"

[search]
port_base = 7000
first_display = 5
max_displays = 3
retry_on_busy = false

[readiness]
enabled = true
attempts = 4
delay_ms = 250

[publish]
set_property = true
property_name = "ci.display"
set_env_var = true
"#;

    let config = XvfbConfig::from_toml_str(toml).expect("full config is valid");

    assert_eq!(
        config.fixed_display().expect("display parses"),
        Some(DisplayNumber::new(42))
    );
    assert_eq!(config.destroy_timeout(), Duration::from_secs(3));
    assert_eq!(
        config.extra_args().expect("args tokenize"),
        vec!["-screen", "0", "1280x1024x24", "-nolisten", "tcp"]
    );

    let search = config.port_search();
    assert_eq!(search.base, 7000);
    assert_eq!(search.first, 5);
    assert_eq!(search.max_search, 3);
    assert!(!search.retry_on_busy);
    assert_eq!(search.lock_dir, std::path::PathBuf::from("/tmp/locks"));

    let probe = config.readiness_probe();
    assert_eq!(probe.program, "/usr/bin/xset");
    assert_eq!(probe.attempts, 4);
    assert_eq!(probe.delay, Duration::from_millis(250));
    assert_eq!(config.publish.property_name, "ci.display");
    assert!(config.publish.set_env_var);
}

#[test]
fn arg_line_respects_quoting() {
    let config = XvfbConfig::from_toml_str(r#"arg_line = "-screen 0 '1024x768x16' -ac""#)
        .expect("quoted arg line is valid");

    assert_eq!(
        config.extra_args().expect("args tokenize"),
        vec!["-screen", "0", "1024x768x16", "-ac"]
    );
}

#[test]
fn unbalanced_arg_line_is_rejected() {
    let err = XvfbConfig::from_toml_str(r#"arg_line = "-screen 'broken""#)
        .expect_err("unbalanced quote must fail");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn disabled_readiness_means_zero_attempts() {
    let config = XvfbConfig::from_toml_str("[readiness]\nenabled = false\nattempts = 7\n")
        .expect("config is valid");

    assert_eq!(config.readiness_probe().attempts, 0);
}

#[test]
fn invalid_fixed_display_is_rejected() {
    let err = XvfbConfig::from_toml_str(r#"display = "localhost:0""#)
        .expect_err("host-qualified display must fail");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn fixed_display_beyond_port_range_is_rejected() {
    let err = XvfbConfig::from_toml_str("display = \":60000\"\n")
        .expect_err("display past the last port must fail");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn search_range_past_last_port_is_rejected() {
    let toml = "[search]\nport_base = 65000\nfirst_display = 500\nmax_displays = 100\n";
    let err = XvfbConfig::from_toml_str(toml).expect_err("overflowing range must fail");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn empty_binary_is_rejected() {
    let err = XvfbConfig::from_toml_str("xvfb_binary = \"  \"\n")
        .expect_err("blank binary must fail");

    assert!(err.to_string().contains("xvfb_binary"), "got {err}");
}

#[test]
fn empty_property_name_is_rejected_when_publishing() {
    let err = XvfbConfig::from_toml_str("[publish]\nproperty_name = \"\"\n")
        .expect_err("blank property name must fail");

    assert!(err.to_string().contains("property_name"), "got {err}");
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = XvfbConfig::from_toml_str("search = [").expect_err("broken toml must fail");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("xvfb.toml");
    std::fs::write(&path, "display = \"7\"\n[search]\nfirst_display = 30\n")
        .expect("write config");

    let config = XvfbConfig::load_from_path(&path).expect("config loads");

    assert_eq!(
        config.fixed_display().expect("display parses"),
        Some(DisplayNumber::new(7))
    );
    assert_eq!(config.search.first_display, 30);
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = XvfbConfig::load_from_path(dir.path().join("absent.toml"))
        .expect_err("missing file must fail");

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}
