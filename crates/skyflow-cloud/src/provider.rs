//! Cloud provider capability traits
//!
//! The orchestrator only needs a narrow slice of what a provider can do:
//! initiate power actions, read a server back, and (optionally) poll a
//! provider-side action by id.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Server status a start operation must reach
pub const STATUS_RUNNING: &str = "running";

/// Server status a stop operation must reach
pub const STATUS_OFF: &str = "off";

/// Server provider abstraction trait
///
/// All providers implement this trait. Providers that expose asynchronous
/// actions with their own ids additionally return an [`ActionPoller`] from
/// [`ServerProvider::action_poller`]; everyone else is polled through
/// [`ServerProvider::get_server`].
#[async_trait]
pub trait ServerProvider: Send + Sync {
    /// Returns the provider name (e.g., "sakura-cloud")
    fn name(&self) -> &str;

    /// Request a power-on
    async fn start_server(&self, id: &str) -> Result<ActionHandle>;

    /// Request a graceful shutdown
    async fn stop_server(&self, id: &str) -> Result<ActionHandle>;

    /// Fetch the current server resource. Fails with [`CloudError::NotFound`]
    /// when the server does not exist.
    async fn get_server(&self, id: &str) -> Result<ServerInfo>;

    /// List all servers visible to the provider
    async fn list_servers(&self) -> Result<Vec<ServerInfo>>;

    /// Create a new server
    async fn create_server(&self, request: &CreateServerRequest) -> Result<CreatedServer> {
        Err(CloudError::Unsupported(format!(
            "{} cannot create server {}",
            self.name(),
            request.name
        )))
    }

    /// Action-polling capability, when the provider has one
    fn action_poller(&self) -> Option<&dyn ActionPoller> {
        None
    }
}

/// Optional capability: poll a provider-side action by id
#[async_trait]
pub trait ActionPoller: Send + Sync {
    async fn poll_action(&self, action_id: &str) -> Result<ActionHandle>;
}

/// Status reported by a provider for an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleStatus {
    Running,
    Success,
    Error,
}

impl std::fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleStatus::Running => write!(f, "running"),
            HandleStatus::Success => write!(f, "success"),
            HandleStatus::Error => write!(f, "error"),
        }
    }
}

/// In-progress handle returned when an action is initiated or polled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionHandle {
    pub status: HandleStatus,

    /// Provider action id; empty when the provider has no action concept
    pub action_id: String,

    /// Progress percentage, if the provider reports one
    pub progress: Option<u8>,

    /// Provider error text for `Error` handles
    pub error: Option<String>,
}

impl ActionHandle {
    pub fn running(action_id: impl Into<String>) -> Self {
        Self {
            status: HandleStatus::Running,
            action_id: action_id.into(),
            progress: None,
            error: None,
        }
    }

    pub fn success(action_id: impl Into<String>) -> Self {
        Self {
            status: HandleStatus::Success,
            action_id: action_id.into(),
            progress: Some(100),
            error: None,
        }
    }

    pub fn error(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HandleStatus::Error,
            action_id: action_id.into(),
            progress: None,
            error: Some(message.into()),
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn has_action_id(&self) -> bool {
        !self.action_id.is_empty()
    }
}

/// Observed server resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    pub name: String,

    /// Normalized status ("running", "off", "starting", ...)
    pub status: String,

    pub ip_address: Option<String>,
}

impl ServerInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: status.into(),
            ip_address: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }
}

/// Parameters for creating a server
#[derive(Debug, Clone, Default)]
pub struct CreateServerRequest {
    pub name: String,
    pub plan: Option<String>,
    pub disk_size: Option<i32>,
    pub os: Option<String>,
    pub tags: Vec<String>,
}

/// Result of a create call: the new server and the action tracking its boot
#[derive(Debug, Clone)]
pub struct CreatedServer {
    pub server: ServerInfo,
    pub handle: ActionHandle,
}
