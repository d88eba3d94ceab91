//! Durable action records

use crate::provider::{ActionHandle, HandleStatus, STATUS_OFF, STATUS_RUNNING};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server lifecycle command tracked by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCommand {
    StartServer,
    StopServer,
    CreateServer,
}

impl ActionCommand {
    /// Server status the command is defined to end in
    pub fn target_status(&self) -> &'static str {
        match self {
            ActionCommand::StartServer | ActionCommand::CreateServer => STATUS_RUNNING,
            ActionCommand::StopServer => STATUS_OFF,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCommand::StartServer => "start_server",
            ActionCommand::StopServer => "stop_server",
            ActionCommand::CreateServer => "create_server",
        }
    }
}

impl std::fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a tracked action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Running)
    }
}

impl From<HandleStatus> for ActionStatus {
    fn from(status: HandleStatus) -> Self {
        match status {
            HandleStatus::Running => ActionStatus::Running,
            HandleStatus::Success => ActionStatus::Success,
            HandleStatus::Error => ActionStatus::Error,
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Running => write!(f, "running"),
            ActionStatus::Success => write!(f, "success"),
            ActionStatus::Error => write!(f, "error"),
        }
    }
}

/// One tracked server operation, persisted by [`crate::store::ActionStore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Local identifier, assigned by the store on first save
    pub id: Option<u64>,

    /// Provider action id (empty when the provider has no action concept)
    pub action_id: String,

    pub provider: String,
    pub server_id: String,
    pub server_name: Option<String>,
    pub command: ActionCommand,

    /// Server status the operation must reach
    pub target_status: String,

    pub status: ActionStatus,

    /// Best-effort progress, 0-100
    pub progress: u8,

    /// Error detail, only set when `status` is `Error`
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionRecord {
    /// New, unsaved record in the `running` state
    pub fn new(
        provider: impl Into<String>,
        server_id: impl Into<String>,
        command: ActionCommand,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            action_id: String::new(),
            provider: provider.into(),
            server_id: server_id.into(),
            server_name: None,
            command,
            target_status: command.target_status().to_string(),
            status: ActionStatus::Running,
            progress: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = action_id.into();
        self
    }

    /// Fill the record from an initial provider handle
    pub fn apply_handle(&mut self, handle: &ActionHandle) {
        if handle.has_action_id() {
            self.action_id = handle.action_id.clone();
        }
        if let Some(progress) = handle.progress {
            self.set_progress(progress);
        }
        match handle.status {
            HandleStatus::Running => {}
            // action-level success still needs confirmation against the server
            HandleStatus::Success => {}
            HandleStatus::Error => {
                let message = handle
                    .error
                    .clone()
                    .unwrap_or_else(|| "action failed".to_string());
                self.mark_error(message);
            }
        }
    }

    pub fn set_progress(&mut self, progress: u8) {
        if !self.status.is_terminal() {
            self.progress = progress.min(100);
        }
    }

    /// `running -> success`; a terminal record is left untouched.
    /// Returns whether the transition happened.
    pub fn mark_success(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ActionStatus::Success;
        self.progress = 100;
        self.error = None;
        true
    }

    /// `running -> error`; a terminal record is left untouched.
    pub fn mark_error(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ActionStatus::Error;
        self.error = Some(message.into());
        true
    }

    pub fn is_running(&self) -> bool {
        self.status == ActionStatus::Running
    }

    /// Server name when known, otherwise the id
    pub fn display_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.server_id)
    }
}
