//! 偽の usacloud を使った server / action コマンドの結合テスト
#![cfg(unix)]

mod common;

use common::{SERVER_ID, TestEnv};
use predicates::prelude::*;

#[test]
fn test_server_list() {
    let env = TestEnv::new();
    env.sky()
        .args(["server", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(SERVER_ID))
        .stdout(predicate::str::contains("web"))
        .stdout(predicate::str::contains("running"));
}

#[test]
fn test_server_stop_waits_for_off() {
    let env = TestEnv::new();
    env.sky()
        .args(["server", "stop", SERVER_ID])
        .assert()
        .success()
        .stdout(predicate::str::contains("停止しました"));

    let store = env.store_json();
    let record = &store["records"]["1"];
    assert_eq!(record["status"], "success");
    assert_eq!(record["command"], "stop_server");
    assert_eq!(record["target_status"], "off");
    assert_eq!(record["progress"], 100);
    assert!(store["pending"].as_array().unwrap().is_empty());
}

#[test]
fn test_server_start_unknown_id_fails() {
    let env = TestEnv::new();
    env.sky()
        .args(["server", "start", "999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));

    // リクエストが受け付けられなかったので記録は残らない
    let store = env.store_json();
    assert!(store["records"].as_object().unwrap().is_empty());
}

#[test]
fn test_rate_limit_marks_action_failed() {
    let env = TestEnv::new();
    env.sky()
        .args(["server", "stop", SERVER_ID])
        .env("FAKE_MODE", "ratelimit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Rate limited"));

    let store = env.store_json();
    let record = &store["records"]["1"];
    assert_eq!(record["status"], "error");
    assert!(record["error"].as_str().unwrap().contains("429"));
}

#[test]
fn test_no_wait_then_resume() {
    let env = TestEnv::new();
    env.sky()
        .args(["server", "stop", SERVER_ID, "--no-wait"])
        .assert()
        .success()
        .stdout(predicate::str::contains("アクション #1 を記録しました"));

    env.sky()
        .args(["action", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("停止"))
        .stdout(predicate::str::contains("running"));

    env.sky()
        .args(["action", "--resume"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#1"))
        .stdout(predicate::str::contains("完了"));

    env.sky()
        .args(["action", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("進行中のアクションはありません"));
}

#[test]
fn test_duplicate_action_is_refused_without_force() {
    let env = TestEnv::new();
    env.sky()
        .args(["server", "stop", SERVER_ID, "--no-wait"])
        .assert()
        .success();

    env.sky()
        .args(["server", "start", SERVER_ID])
        .assert()
        .failure()
        .stderr(predicate::str::contains("進行中のアクション #1"))
        .stderr(predicate::str::contains("--force"));

    env.sky()
        .args(["server", "start", SERVER_ID, "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("起動しました"));
}

#[test]
fn test_resume_with_nothing_pending() {
    let env = TestEnv::new();
    env.sky()
        .args(["action", "resume"])
        .assert()
        .success()
        .stdout(predicate::str::contains("再開するアクションはありません"));
}

#[test]
fn test_resume_failure_exits_non_zero() {
    let env = TestEnv::new();
    env.sky()
        .args(["server", "stop", SERVER_ID, "--no-wait"])
        .assert()
        .success();

    env.sky()
        .args(["action", "resume"])
        .env("FAKE_MODE", "ratelimit")
        .assert()
        .failure()
        .stdout(predicate::str::contains("失敗"));

    env.sky()
        .args(["action", "list", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("error"));
}

#[test]
fn test_prune_removes_finished_actions() {
    let env = TestEnv::new();
    env.set_server_state("down");
    env.sky()
        .args(["server", "start", SERVER_ID])
        .assert()
        .success();
    env.sky()
        .args(["server", "stop", SERVER_ID, "--no-wait"])
        .assert()
        .success();

    env.sky()
        .args(["action", "prune", "--days", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 件"));

    // 進行中のアクションは残る
    let store = env.store_json();
    let records = store["records"].as_object().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.contains_key("2"));
}

#[test]
fn test_unknown_provider_lists_available() {
    let env = TestEnv::new();
    env.sky()
        .args(["--provider", "aws", "server", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("利用可能なプロバイダー"))
        .stderr(predicate::str::contains("sakura-cloud"));
}

#[test]
fn test_invalid_config_is_reported() {
    let env = TestEnv::new();
    std::fs::write(env.path().join("config.yaml"), "max_attempts: 0\n").unwrap();
    env.sky()
        .args(["server", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}
