//! CLI Integration Tests
//!
//! These tests run the `glucopatch` binary. Everything except the tests
//! marked `#[ignore]` works without Bluetooth: `decode` needs no device and
//! `watch --demo` uses a simulated patch.
//!
//! Run hardware tests:
//! ```
//! GLUCOPATCH_DEVICE="ESP32-GlucoPatch" cargo test --package glucopatch-cli --test cli_integration -- --ignored --nocapture
//! ```

use std::env;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const VALID_PAYLOAD: &str = r#"{"glucose_mg_dL": 105, "temperature_C": 36.8}"#;

/// Run glucopatch with a private config file so the user's settings never leak in.
fn run_glucopatch(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_glucopatch"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("GLUCOPATCH_DEVICE")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run glucopatch binary")
}

fn scratch_config() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    (dir, path)
}

fn get_device() -> Option<String> {
    env::var("GLUCOPATCH_DEVICE").ok().filter(|s| !s.is_empty())
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_command() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["--help"]);
    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("GlucoPatch"));
    for command in ["scan", "watch", "decode", "config", "completions"] {
        assert!(stdout.contains(command), "Help should list {command}");
    }
}

#[test]
fn test_version_command() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_completions_bash() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("glucopatch"));
}

#[test]
fn test_no_color_env_accepts_any_value() {
    let (_dir, config) = scratch_config();
    for value in ["1", "yes", "true"] {
        let output = Command::new(env!("CARGO_BIN_EXE_glucopatch"))
            .arg("--config")
            .arg(&config)
            .args(["config", "path"])
            .env("NO_COLOR", value)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "NO_COLOR={value} should be accepted: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_decode_json_output() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["decode", VALID_PAYLOAD, "--format", "json"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["glucose_mg_dL"], 105.0);
    assert_eq!(json["temperature_C"], 36.8);
    assert!(json["received_at"].is_string());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Received"), "Log line should go to stderr");
}

#[test]
fn test_decode_text_output() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["decode", VALID_PAYLOAD]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("105 mg/dL"));
    assert!(stdout.contains("36.8 °C"));
}

#[test]
fn test_decode_invalid_payload_fails() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["decode", "not json at all", "--format", "json"]);
    assert!(!output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["error"], "syntax");
    assert_eq!(json["raw"], "not json at all");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WARN"));
    assert!(stderr.contains("not json at all"));
}

#[test]
fn test_decode_from_stdin() {
    let (_dir, config) = scratch_config();
    let mut child = Command::new(env!("CARGO_BIN_EXE_glucopatch"))
        .arg("--config")
        .arg(&config)
        .args(["--quiet", "decode", "--format", "csv"])
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(format!("{VALID_PAYLOAD}\n").as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("received_at,"));
    assert!(lines[1].contains(",105,36.8,"));
    assert!(output.stderr.is_empty(), "Quiet mode hides info log lines");
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_path() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["config", "path"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        config.display().to_string()
    );
}

#[test]
fn test_config_init_then_show() {
    let (_dir, config) = scratch_config();

    let output = run_glucopatch(&config, &["config", "show"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("not found, showing defaults"));

    let output = run_glucopatch(&config, &["config", "init"]);
    assert!(output.status.success());
    assert!(config.exists());

    let output = run_glucopatch(&config, &["config", "show"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name_prefix = \"ESP32\""));
    assert!(stdout.contains("4fafc201-1fb5-459e-8fcc-c5c9c331914b"));

    let output = run_glucopatch(&config, &["config", "init"]);
    assert!(!output.status.success(), "Init must not overwrite silently");
    let output = run_glucopatch(&config, &["config", "init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn test_unparsable_config_falls_back_to_defaults() {
    let (_dir, config) = scratch_config();
    std::fs::write(&config, "scan_timeout_secs = [").unwrap();

    let output = run_glucopatch(&config, &["decode", VALID_PAYLOAD]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Warning"));
}

// =============================================================================
// Watch Tests (simulated patch)
// =============================================================================

#[test]
fn test_watch_demo_json_lines() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(
        &config,
        &["watch", "--demo", "--count", "3", "--format", "json"],
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        let json: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(json["glucose_mg_dL"].is_number());
        assert!(json["temperature_C"].is_number());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Notifications enabled"));
    assert!(stderr.contains("Received 3 reading(s)."));
}

#[test]
fn test_watch_demo_csv_to_file() {
    let (dir, config) = scratch_config();
    let out = dir.path().join("readings.csv");
    let output = run_glucopatch(
        &config,
        &[
            "--quiet",
            "watch",
            "--demo",
            "-n",
            "2",
            "--format",
            "csv",
            "--output",
            out.to_str().unwrap(),
        ],
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let csv = std::fs::read_to_string(&out).unwrap();
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn test_watch_demo_unknown_device() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["watch", "--demo", "--device", "NOPE", "-n", "1"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Device discovery failed"));
    assert!(stderr.contains("Could not connect to a patch"));
}

// =============================================================================
// Hardware Tests
// =============================================================================

#[test]
#[ignore = "requires BLE hardware"]
fn test_scan_json_output() {
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(&config, &["scan", "--timeout", "5", "--format", "json"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["devices"].is_array());
}

#[test]
#[ignore = "requires BLE hardware and device"]
fn test_watch_single_reading() {
    let Some(device) = get_device() else {
        eprintln!("GLUCOPATCH_DEVICE not set, skipping");
        return;
    };
    let (_dir, config) = scratch_config();
    let output = run_glucopatch(
        &config,
        &["watch", "--device", &device, "-n", "1", "--format", "json"],
    );
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["glucose_mg_dL"].is_number());
}
