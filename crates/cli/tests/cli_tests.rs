//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

fn txmon(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_txmon"))
        .args(args)
        .env_remove("TXMON_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = txmon(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Transaction Monitor"),
        "Should show app name"
    );
    assert!(stdout.contains("simulate"), "Should show simulate command");
    assert!(stdout.contains("analyze"), "Should show analyze command");
    assert!(stdout.contains("get"), "Should show get command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = txmon(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("txmon"), "Should show binary name");
}

/// Test simulate subcommand help
#[test]
fn test_simulate_help() {
    let output = txmon(&["simulate", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Simulate help should succeed");
    assert!(stdout.contains("--delay-ms"), "Should show delay option");
    assert!(
        stdout.contains("--alerts-only"),
        "Should show alerts-only option"
    );
}

/// Test get subcommands help
#[test]
fn test_get_help_lists_queries() {
    let output = txmon(&["get", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Get help should succeed");
    for query in ["metrics", "alerts", "baseline", "summary"] {
        assert!(stdout.contains(query), "Should show {} query", query);
    }
}

#[test]
fn test_get_alerts_help() {
    let output = txmon(&["get", "alerts", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Get alerts help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

#[test]
fn test_get_summary_help() {
    let output = txmon(&["get", "summary", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Get summary help should succeed");
    assert!(stdout.contains("--minutes"), "Should show minutes option");
}

/// Test format option
#[test]
fn test_format_option() {
    let output = txmon(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
}

/// Test api-url option
#[test]
fn test_api_url_option() {
    let output = txmon(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("TXMON_API_URL"), "Should show env var");
}

/// Offline analysis runs without a server
#[test]
fn test_analyze_json_output() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "timestamp,status,count").unwrap();
    writeln!(csv, "2025-07-12 13:00:00,approved,90").unwrap();
    writeln!(csv, "2025-07-12 13:00:00,denied,10").unwrap();
    writeln!(csv, "2025-07-12 13:01:00,approved,80").unwrap();
    writeln!(csv, "2025-07-12 13:01:00,denied,20").unwrap();

    let path = csv.path().to_str().unwrap();
    let output = txmon(&["--format", "json", "analyze", path]);
    assert!(output.status.success(), "Analyze should succeed");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["observations"], 4);
    let denied = report["patterns"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["status"] == "denied")
        .unwrap();
    assert_eq!(denied["minutes"], 2);
    assert_eq!(denied["critical_minutes"], 1);
    assert_eq!(denied["warning_minutes"], 2);
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = txmon(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = txmon(&["simulate"]);

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
