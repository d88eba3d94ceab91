//! Sakura Cloud provider implementation

use crate::usacloud::{self, CreateServerConfig, Usacloud};
use async_trait::async_trait;
use skyflow_cloud::{
    ActionHandle, CreateServerRequest, CreatedServer, Result, STATUS_OFF, STATUS_RUNNING,
    ServerInfo, ServerProvider,
};
use std::path::PathBuf;

pub const PROVIDER_NAME: &str = "sakura-cloud";

pub const DEFAULT_ZONE: &str = "is1a";

/// Parse plan string like "2core-4gb" to (core, memory_gb)
fn parse_plan(plan: Option<&str>) -> (i32, i32) {
    if let Some(p) = plan {
        let parts: Vec<&str> = p.split('-').collect();
        if parts.len() == 2 {
            let core = parts[0]
                .trim_end_matches("core")
                .parse::<i32>()
                .unwrap_or(1);
            let memory = parts[1].trim_end_matches("gb").parse::<i32>().unwrap_or(1);
            return (core, memory);
        }
    }
    (1, 1) // Default: 1 core, 1GB
}

/// Map usacloud's `InstanceStatus` onto the shared status vocabulary
fn normalize_status(instance_status: Option<&str>) -> String {
    match instance_status {
        Some("up") => STATUS_RUNNING.to_string(),
        Some("down") => STATUS_OFF.to_string(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

impl From<usacloud::ServerInfo> for ServerInfo {
    fn from(info: usacloud::ServerInfo) -> Self {
        let ip_address = info.ip_address();
        Self {
            status: normalize_status(info.instance_status.as_deref()),
            id: info.id,
            name: info.name,
            ip_address,
        }
    }
}

/// Sakura Cloud provider
///
/// Power operations through usacloud expose no action id, so progress is
/// always observed through the server status.
pub struct SakuraCloudProvider {
    usacloud: Usacloud,
}

impl SakuraCloudProvider {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            usacloud: Usacloud::new(zone),
        }
    }

    /// Use a specific usacloud binary
    pub fn with_usacloud_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.usacloud = self.usacloud.with_program(program);
        self
    }

    pub fn zone(&self) -> &str {
        self.usacloud.zone()
    }
}

#[async_trait]
impl ServerProvider for SakuraCloudProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn start_server(&self, id: &str) -> Result<ActionHandle> {
        tracing::info!("Powering on server {} in {}", id, self.zone());
        self.usacloud.power_on(id).await?;
        Ok(ActionHandle::running(""))
    }

    async fn stop_server(&self, id: &str) -> Result<ActionHandle> {
        tracing::info!("Shutting down server {} in {}", id, self.zone());
        self.usacloud.power_off(id).await?;
        Ok(ActionHandle::running(""))
    }

    async fn get_server(&self, id: &str) -> Result<ServerInfo> {
        Ok(self.usacloud.get_server_by_id(id).await?.into())
    }

    async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        let servers = self.usacloud.list_servers().await?;
        Ok(servers.into_iter().map(Into::into).collect())
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<CreatedServer> {
        let (core, memory) = parse_plan(request.plan.as_deref());
        let config = CreateServerConfig {
            name: request.name.clone(),
            core,
            memory,
            disk_size: request.disk_size,
            os_type: request.os.clone(),
            tags: request.tags.clone(),
        };

        tracing::info!(
            "Creating server {} ({}core-{}gb) in {}",
            config.name,
            core,
            memory,
            self.zone()
        );
        let created = self.usacloud.create_server(&config).await?;

        Ok(CreatedServer {
            server: created.into(),
            handle: ActionHandle::running(""),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyflow_cloud::CloudError;

    #[test]
    fn test_parse_plan() {
        assert_eq!(parse_plan(Some("2core-4gb")), (2, 4));
        assert_eq!(parse_plan(Some("4core-8gb")), (4, 8));
        assert_eq!(parse_plan(Some("large")), (1, 1));
        assert_eq!(parse_plan(None), (1, 1));
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status(Some("up")), STATUS_RUNNING);
        assert_eq!(normalize_status(Some("down")), STATUS_OFF);
        assert_eq!(normalize_status(Some("cleaning")), "cleaning");
        assert_eq!(normalize_status(None), "unknown");
    }

    #[test]
    fn test_server_info_conversion() {
        let json = r#"{
            "ID": 113000000001,
            "Name": "web",
            "InstanceStatus": "up",
            "Interfaces": [{"IPAddress": "203.0.113.10"}]
        }"#;
        let raw: usacloud::ServerInfo = serde_json::from_str(json).unwrap();
        let info: ServerInfo = raw.into();

        assert_eq!(info.id, "113000000001");
        assert_eq!(info.status, STATUS_RUNNING);
        assert!(info.is_running());
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.10"));
    }

    #[test]
    fn test_provider_capabilities() {
        let provider = SakuraCloudProvider::new(DEFAULT_ZONE);
        assert_eq!(provider.name(), "sakura-cloud");
        assert_eq!(provider.zone(), "is1a");
        assert!(provider.action_poller().is_none());
    }

    #[tokio::test]
    async fn test_missing_usacloud_is_reported() {
        let provider =
            SakuraCloudProvider::new(DEFAULT_ZONE).with_usacloud_program("/nonexistent/usacloud");
        match provider.start_server("113000000001").await {
            Err(CloudError::Api(msg)) => assert!(msg.contains("usacloud not found")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
