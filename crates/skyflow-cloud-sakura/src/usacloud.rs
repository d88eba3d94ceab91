//! usacloud CLI wrapper
//!
//! Wraps the usacloud CLI commands for Sakura Cloud server operations.

use crate::error::{Result, SakuraError, classify_failure};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// usacloud CLI wrapper
pub struct Usacloud {
    program: PathBuf,
    zone: String,
}

impl Usacloud {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("usacloud"),
            zone: zone.into(),
        }
    }

    /// Use a specific usacloud binary instead of the one on PATH
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Run a usacloud command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--zone").arg(&self.zone);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: usacloud --zone {} {}", self.zone, args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SakuraError::UsacloudNotFound
            } else {
                SakuraError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!("usacloud failed: {}", stderr.trim());
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// List all servers
    pub async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        let output = self
            .run_command(&["server", "list", "--output-type", "json"])
            .await?;

        if output.trim().is_empty() || output.trim() == "[]" {
            return Ok(Vec::new());
        }

        let servers: Vec<ServerInfo> = serde_json::from_str(&output)?;
        Ok(servers)
    }

    /// Get server by ID
    pub async fn get_server_by_id(&self, id: &str) -> Result<ServerInfo> {
        let output = self
            .run_command(&["server", "read", id, "--output-type", "json"])
            .await?;

        parse_single_server(&output).ok_or_else(|| SakuraError::NotFound(id.to_string()))?
    }

    /// Create a server
    pub async fn create_server(&self, config: &CreateServerConfig) -> Result<ServerInfo> {
        let core_str = config.core.to_string();
        let memory_str = config.memory.to_string();
        let disk_size_str = config.disk_size.map(|d| d.to_string());

        let mut args = vec![
            "server",
            "create",
            "--name",
            config.name.as_str(),
            "--cpu",
            core_str.as_str(),
            "--memory",
            memory_str.as_str(),
            "--output-type",
            "json",
            "--yes",
        ];

        if let Some(ref disk_size) = disk_size_str {
            args.push("--disk-size");
            args.push(disk_size.as_str());
        }

        if let Some(ref os) = config.os_type {
            args.push("--os-type");
            args.push(os.as_str());
        }

        for tag in &config.tags {
            args.push("--tags");
            args.push(tag.as_str());
        }

        let output = self.run_command(&args).await?;

        parse_single_server(&output).ok_or_else(|| {
            SakuraError::UnexpectedOutput("server create returned no server".to_string())
        })?
    }

    /// Power on a server
    pub async fn power_on(&self, id: &str) -> Result<()> {
        self.run_command(&["server", "power-on", id, "--yes"]).await?;
        Ok(())
    }

    /// Power off a server (graceful shutdown)
    pub async fn power_off(&self, id: &str) -> Result<()> {
        self.run_command(&["server", "shutdown", id, "--yes"]).await?;
        Ok(())
    }
}

/// `server read` and `server create` print either one object or a one-element array
fn parse_single_server(output: &str) -> Option<Result<ServerInfo>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<ServerInfo>>(trimmed) {
            Ok(servers) => servers.into_iter().next().map(Ok),
            Err(e) => Some(Err(e.into())),
        }
    } else {
        Some(serde_json::from_str::<ServerInfo>(trimmed).map_err(Into::into))
    }
}

/// Server information from usacloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "ID", deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "CPU")]
    pub cpu: Option<i32>,

    #[serde(rename = "MemoryMB")]
    pub memory_mb: Option<i32>,

    #[serde(rename = "InstanceStatus")]
    pub instance_status: Option<String>,

    #[serde(rename = "Interfaces")]
    pub interfaces: Option<Vec<InterfaceInfo>>,
}

impl ServerInfo {
    /// Get the first IP address
    pub fn ip_address(&self) -> Option<String> {
        self.interfaces
            .as_ref()?
            .iter()
            .find_map(|i| i.ip_address.clone())
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.instance_status.as_deref() == Some("up")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    #[serde(rename = "IPAddress")]
    pub ip_address: Option<String>,
}

/// Configuration for creating a server
#[derive(Debug, Clone)]
pub struct CreateServerConfig {
    pub name: String,
    pub core: i32,
    pub memory: i32,
    pub disk_size: Option<i32>,
    pub os_type: Option<String>,
    pub tags: Vec<String>,
}

/// usacloud prints IDs as numbers, older versions as strings
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}
