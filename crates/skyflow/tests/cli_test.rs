#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("待たずに見届ける"))
        .stdout(predicate::str::contains("server"))
        .stdout(predicate::str::contains("action"))
        .stdout(predicate::str::contains("watch"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("skyflow"));
}

/// serverコマンドのヘルプにサブコマンドが並ぶことを確認
#[test]
fn test_server_help() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.args(["server", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("stop"))
        .stdout(predicate::str::contains("create"));
}

/// start のオプションを確認
#[test]
fn test_server_start_help() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.args(["server", "start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<ID>"))
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--no-wait"));
}

/// actionコマンドのヘルプを確認
#[test]
fn test_action_help() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.args(["action", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--resume"))
        .stdout(predicate::str::contains("prune"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// IDなしの start はエラーになることを確認
#[test]
fn test_server_start_requires_id() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.args(["server", "start"]).assert().failure();
}
