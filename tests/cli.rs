//! Exit-code tests for the binary. None of these reach the network: each
//! fails during configuration or file checks.

#![allow(clippy::unwrap_used)]
#![allow(deprecated)] // cargo_bin deprecation

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with a clean environment and an empty config dir.
fn cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dataset-sync-cli").unwrap();
    cmd.current_dir(home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("HOME", home.path())
        .env_remove("ROBOFLOW_API_KEY")
        .env_remove("roboflow_api_key")
        .env_remove("ROBOFLOW_WORKSPACE")
        .env_remove("ROBOFLOW_PROJECT")
        .env_remove("ROBOFLOW_API_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn missing_credential_exits_with_2() {
    let home = tempfile::tempdir().unwrap();
    cmd(&home)
        .args(["upload", "-i", "a.jpg", "-w", "team", "-p", "smoke"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ROBOFLOW_API_KEY"));
}

#[test]
fn missing_credential_fails_sync_before_walking_dataset() {
    let home = tempfile::tempdir().unwrap();
    cmd(&home)
        .args(["sync", "--yes", "--data-dir", "/nonexistent", "-w", "team", "-p", "smoke"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Summary").not());
}

#[test]
fn missing_workspace_exits_with_2() {
    let home = tempfile::tempdir().unwrap();
    cmd(&home)
        .env("ROBOFLOW_API_KEY", "key")
        .args(["upload", "-i", "a.jpg", "-p", "smoke"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("workspace"));
}

#[test]
fn fallback_key_variable_is_accepted() {
    let home = tempfile::tempdir().unwrap();
    // Key present via the fallback name, so the run gets as far as the file check.
    cmd(&home)
        .env("roboflow_api_key", "key")
        .args(["upload", "-i", "missing.jpg", "-w", "team", "-p", "smoke"])
        .assert()
        .code(3);
}

#[test]
fn key_and_workspace_can_come_from_dotenv_file() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join(".env"),
        "ROBOFLOW_API_KEY=key\nROBOFLOW_WORKSPACE=team\n",
    )
    .unwrap();
    cmd(&home)
        .args(["upload", "-i", "missing.jpg", "-p", "smoke"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("missing.jpg"));
}

#[test]
fn exported_variables_win_over_dotenv_file() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join(".env"), "ROBOFLOW_WORKSPACE=\n").unwrap();
    cmd(&home)
        .env("ROBOFLOW_API_KEY", "key")
        .env("ROBOFLOW_WORKSPACE", "team")
        .args(["upload", "-i", "missing.jpg", "-p", "smoke"])
        .assert()
        .code(3);
}

#[test]
fn missing_image_exits_with_3() {
    let home = tempfile::tempdir().unwrap();
    cmd(&home)
        .env("ROBOFLOW_API_KEY", "key")
        .env("ROBOFLOW_WORKSPACE", "team")
        .env("ROBOFLOW_PROJECT", "smoke")
        .args(["upload", "--image", "does-not-exist.jpg"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("does-not-exist.jpg"));
}

#[test]
fn workspace_can_come_from_project_config_file() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join(".dataset-sync.toml"),
        "workspace = \"team\"\nproject = \"smoke\"\n",
    )
    .unwrap();
    cmd(&home)
        .env("ROBOFLOW_API_KEY", "key")
        .args(["upload", "-i", "nope.png"])
        .assert()
        .code(3);
}

#[test]
fn invalid_split_is_a_usage_error() {
    let home = tempfile::tempdir().unwrap();
    cmd(&home)
        .args(["sync", "--split", "val"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid"));
}
