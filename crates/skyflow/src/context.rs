//! 設定ファイル・環境変数・CLIフラグから実行環境を組み立てる

use anyhow::Context as _;
use skyflow_cloud::{
    ActionService, ActionStore, RetryConfig, ServerProvider, TrackerConfig, WaitConfig,
};
use skyflow_cloud_sakura::{DEFAULT_ZONE, PROVIDER_NAME, SakuraCloudProvider};
use skyflow_config::Settings;
use std::path::PathBuf;
use std::sync::Arc;

/// 利用可能なプロバイダー
const AVAILABLE_PROVIDERS: &[&str] = &[PROVIDER_NAME];

/// CLIフラグ・環境変数による上書き
#[derive(Debug, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub zone: Option<String>,
    pub store: Option<PathBuf>,
    pub usacloud: Option<PathBuf>,
}

pub struct AppContext {
    pub settings: Settings,
    pub provider: Arc<dyn ServerProvider>,
    pub store: Arc<ActionStore>,
}

impl AppContext {
    pub async fn load(overrides: Overrides) -> anyhow::Result<Self> {
        let mut settings = Settings::load()?;
        if let Some(provider) = overrides.provider {
            settings.provider = provider;
        }
        if let Some(zone) = overrides.zone {
            settings.zone = Some(zone);
        }
        if let Some(store) = overrides.store {
            settings.store_path = Some(store);
        }

        let provider = build_provider(&settings, overrides.usacloud)?;

        let store_path = settings.resolve_store_path()?;
        let store = ActionStore::open(&store_path).await.with_context(|| {
            format!(
                "アクションストアを開けませんでした: {}",
                store_path.display()
            )
        })?;
        tracing::debug!("Action store: {}", store_path.display());

        Ok(Self {
            settings,
            provider,
            store: Arc::new(store),
        })
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            poll_interval: self.settings.poll_interval(),
            max_attempts: self.settings.max_attempts,
            max_transient_errors: self.settings.max_transient_errors,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            wait: self.wait_config(),
            dismiss_delay: self.settings.dismiss_delay(),
            stale_after: self.settings.stale_after(),
            retry: RetryConfig::default(),
        }
    }

    pub fn service(&self) -> ActionService {
        ActionService::new(self.provider.clone(), self.store.clone(), self.wait_config())
    }
}

fn build_provider(
    settings: &Settings,
    usacloud: Option<PathBuf>,
) -> anyhow::Result<Arc<dyn ServerProvider>> {
    match settings.provider.as_str() {
        PROVIDER_NAME => {
            let zone = settings.zone.as_deref().unwrap_or(DEFAULT_ZONE);
            let mut provider = SakuraCloudProvider::new(zone);
            if let Some(program) = usacloud {
                provider = provider.with_usacloud_program(program);
            }
            Ok(Arc::new(provider))
        }
        other => anyhow::bail!(
            "プロバイダー '{}' はサポートされていません\n\n利用可能なプロバイダー: {}",
            other,
            AVAILABLE_PROVIDERS.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sakura_provider() {
        let settings = Settings::default();
        let provider = build_provider(&settings, None).unwrap();
        assert_eq!(provider.name(), "sakura-cloud");
        assert!(provider.action_poller().is_none());
    }

    #[test]
    fn test_unknown_provider_lists_available() {
        let settings = Settings {
            provider: "aws".to_string(),
            ..Settings::default()
        };
        let err = build_provider(&settings, None).err().unwrap();
        let message = err.to_string();
        assert!(message.contains("aws"));
        assert!(message.contains("sakura-cloud"));
    }
}
