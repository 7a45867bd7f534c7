//! CLI Integration Tests
//!
//! These tests run the `pearchat` binary end-to-end against a temporary data
//! directory.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a CLI command with a temporary data directory
fn cli_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pearchat").expect("Failed to find pearchat binary");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

/// Extract the room ID from `room create` output ("Created room: <id>")
fn extract_room_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Created room: "))
        .map(|id| id.trim().to_string())
}

// ============================================================================
// Help and Info Tests
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("chat"));
}

#[test]
fn test_info_command() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("PearChat"))
        .stdout(predicate::str::contains("Identity: pk-"))
        .stdout(predicate::str::contains("Display name: P2P User"))
        .stdout(predicate::str::contains("Peer records: 0"));
}

#[test]
fn test_info_uses_name_override() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["--name", "alice", "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Display name: alice"));
}

// ============================================================================
// Room Command Tests
// ============================================================================

#[test]
fn test_room_create_prints_fresh_ids() {
    let data_dir = TempDir::new().unwrap();

    let first = cli_cmd(&data_dir).args(["room", "create"]).output().unwrap();
    let second = cli_cmd(&data_dir).args(["room", "create"]).output().unwrap();
    assert!(first.status.success());

    let first = extract_room_id(&String::from_utf8_lossy(&first.stdout)).unwrap();
    let second = extract_room_id(&String::from_utf8_lossy(&second.stdout)).unwrap();
    assert!(first.starts_with("room-"));
    assert_ne!(first, second);
}

// ============================================================================
// Send and History Tests
// ============================================================================

#[test]
fn test_history_of_empty_room() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["history", "lobby"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No messages in room lobby."));
}

#[test]
fn test_send_then_history() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["--name", "alice", "send", "lobby", "hello from alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sent message to lobby"))
        .stdout(predicate::str::contains("  ID: "));

    cli_cmd(&data_dir)
        .args(["--name", "bob", "send", "lobby", "hi alice"])
        .assert()
        .success();

    let output = cli_cmd(&data_dir).args(["history", "lobby"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Messages in lobby (2):"));
    let alice = stdout.find("alice: hello from alice").unwrap();
    let bob = stdout.find("bob: hi alice").unwrap();
    assert!(alice < bob);
}

#[test]
fn test_history_is_scoped_to_room() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["send", "r1", "only in r1"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["history", "r2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No messages in room r2."));
}

#[test]
fn test_send_leaves_no_peer_record() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["send", "lobby", "hello"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Peer records: 0"));
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_config_file_sets_display_name() {
    let data_dir = TempDir::new().unwrap();
    let config_path = data_dir.path().join("pearchat.toml");
    std::fs::write(&config_path, "display_name = \"carol\"\n").unwrap();

    cli_cmd(&data_dir)
        .arg("--config")
        .arg(&config_path)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Display name: carol"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let data_dir = TempDir::new().unwrap();
    let config_path = data_dir.path().join("pearchat.toml");
    std::fs::write(&config_path, "heartbeat_interval_ms = 0\n").unwrap();

    cli_cmd(&data_dir)
        .arg("--config")
        .arg(&config_path)
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn test_missing_config_is_rejected() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("--config")
        .arg(data_dir.path().join("missing.toml"))
        .arg("info")
        .assert()
        .failure();
}

// ============================================================================
// Simulation Tests
// ============================================================================

#[test]
fn test_simulate_in_memory() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args([
            "simulate", "--room", "lobby", "--peers", "2", "--seconds", "3", "--memory",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("[peer-1] peer-connected"))
        .stdout(predicate::str::contains("[peer-2] peer-connected"))
        .stdout(predicate::str::contains("peer-1 says hello #1"))
        .stdout(predicate::str::contains("Summary (2 participants, 3 s, room lobby):"));
}

#[test]
fn test_simulate_on_disk_keeps_history() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["simulate", "--room", "lobby", "--peers", "1", "--seconds", "2"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["history", "lobby"])
        .assert()
        .success()
        .stdout(predicate::str::contains("peer-1: peer-1 says hello #1"));
}

// ============================================================================
// Chat Tests
// ============================================================================

#[test]
fn test_chat_sends_stdin_lines() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["--name", "dave", "chat", "lobby"])
        .write_stdin("first line\n/peers\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Joined lobby"))
        .stdout(predicate::str::contains("dave: first line"))
        .stdout(predicate::str::contains("0 peer(s) online"));

    cli_cmd(&data_dir)
        .args(["history", "lobby"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dave: first line"));
}
