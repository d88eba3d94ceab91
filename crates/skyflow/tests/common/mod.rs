#![allow(deprecated)]

use assert_cmd::Command;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// usacloud の代わりに状態ファイルを読み書きするスクリプト
///
/// サーバー 113000000001 (web) だけが存在する。FAKE_MODE=ratelimit で
/// `server read` が 429 を返す。
const FAKE_USACLOUD: &str = r#"#!/bin/sh
STATE="__STATE__"
cmd="$3 $4"
id="$5"
known="113000000001"

status() {
  cat "$STATE/$1" 2>/dev/null || echo up
}

case "$cmd" in
  "server list")
    printf '[{"ID": %s, "Name": "web", "InstanceStatus": "%s"}]\n' "$known" "$(status $known)"
    ;;
  "server read")
    if [ "$FAKE_MODE" = "ratelimit" ]; then
      echo "Error: 429 Too Many Requests" >&2
      exit 1
    fi
    if [ "$id" != "$known" ]; then
      echo "Error: 404 Not Found" >&2
      exit 1
    fi
    printf '{"ID": %s, "Name": "web", "InstanceStatus": "%s"}\n' "$id" "$(status $id)"
    ;;
  "server power-on")
    [ "$id" = "$known" ] || { echo "Error: 404 Not Found" >&2; exit 1; }
    echo up > "$STATE/$id"
    ;;
  "server shutdown")
    [ "$id" = "$known" ] || { echo "Error: 404 Not Found" >&2; exit 1; }
    echo down > "$STATE/$id"
    ;;
  *)
    echo "unexpected: $*" >&2
    exit 1
    ;;
esac
"#;

pub const SERVER_ID: &str = "113000000001";

pub struct TestEnv {
    pub root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let state = root.path().join("state");
        fs::create_dir_all(&state).unwrap();
        fs::create_dir_all(root.path().join("home")).unwrap();

        let script = FAKE_USACLOUD.replace("__STATE__", &state.display().to_string());
        let usacloud = root.path().join("usacloud");
        fs::write(&usacloud, script).unwrap();
        fs::set_permissions(&usacloud, fs::Permissions::from_mode(0o755)).unwrap();

        fs::write(
            root.path().join("config.yaml"),
            "provider: sakura-cloud\nzone: is1a\npoll_interval_secs: 0\nmax_attempts: 5\n",
        )
        .unwrap();

        Self { root }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn store_path(&self) -> PathBuf {
        self.path().join("actions.json")
    }

    /// サーバーの状態を直接書き換える ("up" / "down")
    pub fn set_server_state(&self, state: &str) {
        fs::write(self.path().join("state").join(SERVER_ID), state).unwrap();
    }

    pub fn sky(&self) -> Command {
        let mut cmd = Command::cargo_bin("sky").unwrap();
        cmd.env("SKYFLOW_CONFIG_PATH", self.path().join("config.yaml"))
            .env("SKYFLOW_STORE", self.store_path())
            .env("SKYFLOW_USACLOUD", self.path().join("usacloud"))
            .env("HOME", self.path().join("home"))
            .env("XDG_CONFIG_HOME", self.path().join("home"))
            .env_remove("SKYFLOW_PROVIDER")
            .env_remove("SKYFLOW_ZONE")
            .env_remove("FAKE_MODE")
            .env_remove("RUST_LOG");
        cmd
    }

    /// ストアの中身 (JSON)
    pub fn store_json(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.store_path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}
