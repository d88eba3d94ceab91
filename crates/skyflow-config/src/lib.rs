pub mod error;
pub mod settings;

pub use error::*;
pub use settings::Settings;

use std::path::PathBuf;

/// 設定ファイル名
pub const CONFIG_FILE: &str = "config.yaml";

/// アクションストアのファイル名
pub const STORE_FILE: &str = "actions.json";

/// `sky watch` のログファイル名
pub const WATCH_LOG_FILE: &str = "watch.log";

/// 設定ファイルの場所を直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "SKYFLOW_CONFIG_PATH";

/// SkyFlowの設定ディレクトリを取得 (~/.config/skyflow)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("skyflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイル (config.yaml) を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SKYFLOW_CONFIG_PATH (直接パス指定、存在しなければエラー)
/// 2. ~/.config/skyflow/config.yaml
///
/// 設定ファイルは任意なので、どこにもなければ `None` を返す
pub fn find_config_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV)
        && !config_path.is_empty()
    {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    // 2. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("skyflow").join(CONFIG_FILE);
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// アクションストアの既定パス (~/.config/skyflow/actions.json)
pub fn default_store_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(STORE_FILE))
}

/// `sky watch` 実行中のログ出力先
pub fn watch_log_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(WATCH_LOG_FILE))
}
