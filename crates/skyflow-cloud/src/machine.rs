//! Completion state machine for asynchronous server actions
//!
//! `PollMachine` holds no I/O. Callers issue the poll it asks for, feed the
//! result back through [`PollMachine::on_result`], and act on the returned
//! [`NextStep`]. Both the blocking [`crate::service::ActionService`] and the
//! concurrent [`crate::tracker::OperationTracker`] drive the same machine.

use crate::error::{CloudError, Result};
use crate::provider::{ActionHandle, HandleStatus, ServerInfo};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll tuning shared by both scheduling regimes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Wait between two polls
    pub poll_interval: Duration,

    /// Polls allowed before giving up with a timeout
    pub max_attempts: u32,

    /// Consecutive non-rate-limit poll failures tolerated
    pub max_transient_errors: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_attempts: 100,
            max_transient_errors: 3,
        }
    }
}

/// How completion is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollStrategy {
    /// Poll the provider action; yields progress and precise error text
    ByActionId,
    /// Fetch the server and compare its status with the target
    ByServerStatus,
}

impl std::fmt::Display for PollStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollStrategy::ByActionId => write!(f, "by-action-id"),
            PollStrategy::ByServerStatus => write!(f, "by-server-status"),
        }
    }
}

/// Result of one issued poll
#[derive(Debug)]
pub enum PollResult {
    Action(Result<ActionHandle>),
    Server(Result<ServerInfo>),
}

/// What the driver must do next
#[derive(Debug)]
pub enum NextStep {
    /// Issue one poll. `immediate` skips the interval wait.
    Poll {
        strategy: PollStrategy,
        immediate: bool,
    },
    Succeeded,
    Failed(CloudError),
}

impl NextStep {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NextStep::Poll { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PollMachine {
    config: WaitConfig,
    target_status: String,
    action_id: String,
    strategy: PollStrategy,
    confirming: bool,
    attempts: u32,
    consecutive_errors: u32,
    progress: Option<u8>,
    last_status: Option<String>,
}

impl PollMachine {
    fn new(
        config: WaitConfig,
        action_id: &str,
        target_status: &str,
        supports_action_polling: bool,
    ) -> Self {
        let strategy = if supports_action_polling && !action_id.is_empty() {
            PollStrategy::ByActionId
        } else {
            PollStrategy::ByServerStatus
        };

        Self {
            config,
            target_status: target_status.to_string(),
            action_id: action_id.to_string(),
            strategy,
            confirming: false,
            attempts: 0,
            consecutive_errors: 0,
            progress: None,
            last_status: None,
        }
    }

    /// Machine for a freshly initiated action
    pub fn start(
        config: WaitConfig,
        handle: &ActionHandle,
        target_status: &str,
        supports_action_polling: bool,
    ) -> (Self, NextStep) {
        let mut machine = Self::new(
            config,
            &handle.action_id,
            target_status,
            supports_action_polling,
        );
        machine.progress = handle.progress;

        let step = match handle.status {
            HandleStatus::Error => NextStep::Failed(CloudError::ActionFailed(
                handle
                    .error
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "action failed".to_string()),
            )),
            HandleStatus::Success => machine.enter_confirmation(),
            HandleStatus::Running => machine.next_poll(false),
        };
        (machine, step)
    }

    /// Machine replaying a persisted, still-running action. The first poll is
    /// issued without waiting.
    pub fn resume(
        config: WaitConfig,
        action_id: &str,
        target_status: &str,
        supports_action_polling: bool,
    ) -> (Self, NextStep) {
        let mut machine = Self::new(config, action_id, target_status, supports_action_polling);
        let step = machine.next_poll(true);
        (machine, step)
    }

    /// Feed back the result of the poll last requested
    pub fn on_result(&mut self, result: PollResult) -> NextStep {
        self.attempts += 1;

        match result {
            PollResult::Action(Ok(handle)) => {
                self.consecutive_errors = 0;
                if let Some(progress) = handle.progress {
                    self.progress = Some(progress.min(100));
                }
                match handle.status {
                    HandleStatus::Running => self.next_poll(false),
                    HandleStatus::Success => self.enter_confirmation(),
                    HandleStatus::Error => NextStep::Failed(CloudError::ActionFailed(
                        handle
                            .error
                            .filter(|e| !e.is_empty())
                            .unwrap_or_else(|| format!("action {} failed", self.action_id)),
                    )),
                }
            }
            PollResult::Server(Ok(server)) => {
                self.consecutive_errors = 0;
                let reached = server.status == self.target_status;
                self.last_status = Some(server.status);
                if reached {
                    NextStep::Succeeded
                } else {
                    self.next_poll(false)
                }
            }
            PollResult::Action(Err(e)) | PollResult::Server(Err(e)) => self.on_error(e),
        }
    }

    fn on_error(&mut self, err: CloudError) -> NextStep {
        if err.is_rate_limited() || err.is_cancelled() {
            return NextStep::Failed(err);
        }

        self.consecutive_errors += 1;
        if self.consecutive_errors >= self.config.max_transient_errors {
            return NextStep::Failed(CloudError::ConsecutiveFailures {
                count: self.consecutive_errors,
                last: err.to_string(),
            });
        }

        tracing::warn!(
            "Transient poll error ({}/{}), retrying: {}",
            self.consecutive_errors,
            self.config.max_transient_errors,
            err
        );
        self.next_poll(false)
    }

    /// Action-level success is not completion: some providers report it
    /// before the server has transitioned. Switch to server-status polling
    /// and check right away.
    fn enter_confirmation(&mut self) -> NextStep {
        self.confirming = true;
        self.strategy = PollStrategy::ByServerStatus;
        self.next_poll(true)
    }

    fn next_poll(&mut self, immediate: bool) -> NextStep {
        if self.attempts >= self.config.max_attempts {
            return NextStep::Failed(CloudError::Timeout(format!(
                "server did not reach '{}' after {} polls",
                self.target_status, self.attempts
            )));
        }
        NextStep::Poll {
            strategy: self.strategy,
            immediate,
        }
    }

    pub fn strategy(&self) -> PollStrategy {
        self.strategy
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn target_status(&self) -> &str {
        &self.target_status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn is_confirming(&self) -> bool {
        self.confirming
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Human-readable progress line
    pub fn describe(&self) -> String {
        let mut text = if self.confirming {
            format!("confirming server is {}", self.target_status)
        } else {
            match self.strategy {
                PollStrategy::ByActionId => format!("waiting for action {}", self.action_id),
                PollStrategy::ByServerStatus => {
                    format!("waiting for server to be {}", self.target_status)
                }
            }
        };

        if let Some(status) = &self.last_status {
            text.push_str(&format!(" (now {})", status));
        }
        if let Some(progress) = self.progress
            && self.strategy == PollStrategy::ByActionId
        {
            text.push_str(&format!(" {}%", progress));
        }
        if self.consecutive_errors > 0 {
            text.push_str(&format!(
                " [retry {}/{}]",
                self.consecutive_errors, self.config.max_transient_errors
            ));
        }
        text
    }
}
