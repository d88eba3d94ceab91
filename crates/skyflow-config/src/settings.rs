//! config.yaml の読み込み
//!
//! ```yaml
//! provider: sakura-cloud
//! zone: is1a
//! poll_interval_secs: 3
//! max_attempts: 100
//! max_transient_errors: 3
//! dismiss_delay_secs: 5
//! stale_after_secs: 300
//! store_path: /var/lib/skyflow/actions.json
//! ```
//!
//! 省略した項目は既定値になる。

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 既定のプロバイダー
pub const DEFAULT_PROVIDER: &str = "sakura-cloud";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// 使用するプロバイダー名
    pub provider: String,

    /// ゾーン (未指定ならプロバイダーの既定)
    pub zone: Option<String>,

    /// ポーリング間隔 (秒)
    pub poll_interval_secs: u64,

    /// 1操作あたりの最大ポーリング回数
    pub max_attempts: u32,

    /// 連続エラーの許容回数
    pub max_transient_errors: u32,

    /// 完了した操作をダッシュボードに残す時間 (秒)
    pub dismiss_delay_secs: u64,

    /// これより古い未完了レコードは `sky watch` で再開しない (秒)
    pub stale_after_secs: u64,

    /// アクションストアのパス (未指定なら ~/.config/skyflow/actions.json)
    pub store_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            zone: None,
            poll_interval_secs: 3,
            max_attempts: 100,
            max_transient_errors: 3,
            dismiss_delay_secs: 5,
            stale_after_secs: 300,
            store_path: None,
        }
    }
}

impl Settings {
    /// 設定ファイルを探して読み込む。見つからなければ既定値
    pub fn load() -> Result<Self> {
        match crate::find_config_file()? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        // 空ファイルは既定値として扱う
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Settings =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "provider は空にできません".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_attempts は1以上を指定してください".to_string(),
            ));
        }
        if self.max_transient_errors == 0 {
            return Err(ConfigError::InvalidValue(
                "max_transient_errors は1以上を指定してください".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dismiss_delay(&self) -> Duration {
        Duration::from_secs(self.dismiss_delay_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// アクションストアのパスを解決
    pub fn resolve_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => crate::default_store_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CONFIG_PATH_ENV;
    use serial_test::serial;

    fn parse(content: &str) -> Result<Settings> {
        Settings::parse(content, Path::new("config.yaml"))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.provider, "sakura-cloud");
        assert_eq!(settings.poll_interval(), Duration::from_secs(3));
        assert_eq!(settings.max_attempts, 100);
        assert_eq!(settings.max_transient_errors, 3);
        assert_eq!(settings.dismiss_delay(), Duration::from_secs(5));
        assert_eq!(settings.stale_after(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_partial() {
        let settings = parse("zone: tk1b\npoll_interval_secs: 10\n").unwrap();
        assert_eq!(settings.zone.as_deref(), Some("tk1b"));
        assert_eq!(settings.poll_interval_secs, 10);
        // 省略した項目は既定値
        assert_eq!(settings.provider, DEFAULT_PROVIDER);
        assert_eq!(settings.max_attempts, 100);
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(parse("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_parse_unknown_field() {
        let result = parse("provder: sakura-cloud\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_invalid_values() {
        assert!(matches!(
            parse("max_attempts: 0\n"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            parse("provider: \"\"\n"),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_resolve_store_path_override() {
        let settings = parse("store_path: /tmp/skyflow/actions.json\n").unwrap();
        assert_eq!(
            settings.resolve_store_path().unwrap(),
            PathBuf::from("/tmp/skyflow/actions.json")
        );
    }

    #[test]
    #[serial]
    fn test_load_from_env_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "provider: sakura-cloud\nmax_attempts: 7\n").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(config_path.as_os_str()), || {
            let settings = Settings::load().unwrap();
            assert_eq!(settings.max_attempts, 7);
        });
    }
}
