//! Concurrent operation tracking for interactive front ends
//!
//! The tracker owns every in-flight [`Operation`]. Provider calls run in
//! spawned tasks that never touch tracker state; each task sends exactly one
//! [`TrackerEvent`] back over a channel, and the front end's loop hands those
//! events to [`OperationTracker::handle_event`]. At most one task is in
//! flight per operation, so results for one operation are applied in the
//! order they were issued.

use crate::action::{ActionCommand, ActionRecord};
use crate::error::{CloudError, Result};
use crate::machine::{NextStep, PollMachine, PollResult, PollStrategy, WaitConfig};
use crate::provider::{ActionHandle, STATUS_OFF, STATUS_RUNNING, ServerInfo, ServerProvider};
use crate::retry::{RetryConfig, is_retryable_default, retry_with_backoff};
use crate::store::ActionStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Process-scoped operation identifier
pub type OperationId = u64;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub wait: WaitConfig,

    /// How long a finished operation stays visible
    pub dismiss_delay: Duration,

    /// Pending records not updated within this window are not resumed
    pub stale_after: Duration,

    /// Retry policy for the initial start/stop call
    pub retry: RetryConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            wait: WaitConfig::default(),
            dismiss_delay: Duration::from_secs(5),
            stale_after: Duration::from_secs(5 * 60),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Active,
    Succeeded,
    Failed,
}

/// Live poll-cycle state of one tracked action
#[derive(Debug)]
pub struct Operation {
    id: OperationId,
    record: ActionRecord,
    machine: Option<PollMachine>,
    state: OperationState,
    message: String,
}

impl Operation {
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Local id of the persisted record, once saved
    pub fn record_id(&self) -> Option<u64> {
        self.record.id
    }

    pub fn record(&self) -> &ActionRecord {
        &self.record
    }

    pub fn server_id(&self) -> &str {
        &self.record.server_id
    }

    pub fn command(&self) -> ActionCommand {
        self.record.command
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == OperationState::Active
    }

    /// `None` until the initial provider call has returned
    pub fn strategy(&self) -> Option<PollStrategy> {
        self.machine.as_ref().map(|m| m.strategy())
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.machine
            .as_ref()
            .map(|m| m.consecutive_errors())
            .unwrap_or(0)
    }

    pub fn progress(&self) -> u8 {
        self.record.progress
    }

    /// Human-readable progress or outcome
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result of a background task
#[derive(Debug)]
pub enum TrackerEvent {
    Initiated {
        op: OperationId,
        result: Result<ActionHandle>,
    },
    Polled {
        op: OperationId,
        result: PollResult,
    },
    Dismiss {
        op: OperationId,
    },
}

/// What changed, for the front end to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerUpdate {
    Progress(OperationId),
    Succeeded(OperationId),
    Failed(OperationId, String),
    Dismissed(OperationId),
}

pub struct OperationTracker {
    provider: Arc<dyn ServerProvider>,
    store: Arc<ActionStore>,
    config: TrackerConfig,
    operations: BTreeMap<OperationId, Operation>,
    next_id: OperationId,
    events_tx: mpsc::UnboundedSender<TrackerEvent>,
    events_rx: mpsc::UnboundedReceiver<TrackerEvent>,
    cancel: CancellationToken,
}

impl OperationTracker {
    pub fn new(
        provider: Arc<dyn ServerProvider>,
        store: Arc<ActionStore>,
        config: TrackerConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            provider,
            store,
            config,
            operations: BTreeMap::new(),
            next_id: 1,
            events_tx,
            events_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Pick up fresh `running` records of the active provider left behind by
    /// an earlier process. Returns the number of operations resumed.
    pub async fn reconcile(&mut self) -> Result<usize> {
        let stale_after =
            chrono::Duration::from_std(self.config.stale_after).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let supports_polling = self.provider.action_poller().is_some();

        let pending = self.store.list_pending().await?;
        let mut resumed = 0;

        for record in pending {
            if record.provider != self.provider.name() {
                continue;
            }
            if now.signed_duration_since(record.updated_at) > stale_after {
                tracing::debug!(
                    "Skipping stale action #{} for {}",
                    record.id.unwrap_or_default(),
                    record.server_id
                );
                continue;
            }
            if self
                .operations
                .values()
                .any(|op| op.record.id.is_some() && op.record.id == record.id)
            {
                continue;
            }

            let (machine, step) = PollMachine::resume(
                self.config.wait.clone(),
                &record.action_id,
                &record.target_status,
                supports_polling,
            );
            let op_id = self.allocate_id();
            tracing::info!(
                "Resuming {} #{} for {}",
                record.command,
                record.id.unwrap_or_default(),
                record.server_id
            );
            self.operations.insert(
                op_id,
                Operation {
                    id: op_id,
                    message: machine.describe(),
                    record,
                    machine: Some(machine),
                    state: OperationState::Active,
                },
            );
            self.apply_step(op_id, step).await;
            resumed += 1;
        }

        Ok(resumed)
    }

    /// Start a running server or stop a stopped one. Returns `None` when the
    /// status allows neither or the server already has an active operation.
    pub async fn start_toggle(&mut self, server: &ServerInfo) -> Option<OperationId> {
        let command = match server.status.as_str() {
            STATUS_RUNNING => ActionCommand::StopServer,
            STATUS_OFF | "stopped" => ActionCommand::StartServer,
            other => {
                tracing::debug!("No toggle for {} in status '{}'", server.id, other);
                return None;
            }
        };

        if self.is_tracking(&server.id) {
            tracing::info!("{} already has an operation in progress", server.id);
            return None;
        }

        let mut record = ActionRecord::new(self.provider.name(), &server.id, command)
            .with_server_name(&server.name);
        persist(&self.store, &mut record).await;

        let op_id = self.allocate_id();
        self.operations.insert(
            op_id,
            Operation {
                id: op_id,
                message: format!("requesting {}", command),
                record,
                machine: None,
                state: OperationState::Active,
            },
        );

        let provider = self.provider.clone();
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        let retry = self.config.retry.clone();
        let server_id = server.id.clone();
        tokio::spawn(async move {
            let result = retry_with_backoff(&retry, &cancel, is_retryable_default, || {
                let provider = provider.clone();
                let server_id = server_id.clone();
                async move {
                    match command {
                        ActionCommand::StopServer => provider.stop_server(&server_id).await,
                        _ => provider.start_server(&server_id).await,
                    }
                }
            })
            .await;
            let _ = tx.send(TrackerEvent::Initiated { op: op_id, result });
        });

        Some(op_id)
    }

    /// Wait for the next background result
    pub async fn next_event(&mut self) -> Option<TrackerEvent> {
        self.events_rx.recv().await
    }

    /// Apply one background result to its operation
    pub async fn handle_event(&mut self, event: TrackerEvent) -> Option<TrackerUpdate> {
        match event {
            TrackerEvent::Initiated { op, result } => {
                let supports_polling = self.provider.action_poller().is_some();
                let wait = self.config.wait.clone();
                let operation = self.operations.get_mut(&op)?;

                let step = match result {
                    Ok(handle) => {
                        operation.record.apply_handle(&handle);
                        let (machine, step) = PollMachine::start(
                            wait,
                            &handle,
                            &operation.record.target_status,
                            supports_polling,
                        );
                        operation.message = machine.describe();
                        operation.machine = Some(machine);
                        step
                    }
                    Err(err) => NextStep::Failed(err),
                };
                self.apply_step(op, step).await
            }
            TrackerEvent::Polled { op, result } => {
                let operation = self.operations.get_mut(&op)?;
                let machine = operation.machine.as_mut()?;

                let step = machine.on_result(result);
                if let Some(progress) = machine.progress() {
                    operation.record.set_progress(progress);
                }
                operation.message = machine.describe();
                self.apply_step(op, step).await
            }
            TrackerEvent::Dismiss { op } => {
                self.operations.remove(&op)?;
                Some(TrackerUpdate::Dismissed(op))
            }
        }
    }

    async fn apply_step(&mut self, op: OperationId, step: NextStep) -> Option<TrackerUpdate> {
        let operation = self.operations.get_mut(&op)?;

        match step {
            NextStep::Poll {
                strategy,
                immediate,
            } => {
                persist(&self.store, &mut operation.record).await;
                let delay = if immediate {
                    Duration::ZERO
                } else {
                    self.config.wait.poll_interval
                };
                let action_id = operation.record.action_id.clone();
                let server_id = operation.record.server_id.clone();
                self.spawn_poll(op, strategy, action_id, server_id, delay);
                Some(TrackerUpdate::Progress(op))
            }
            NextStep::Succeeded => {
                operation.record.mark_success();
                operation.state = OperationState::Succeeded;
                operation.message = format!(
                    "{} is {}",
                    operation.record.display_name(),
                    operation.record.target_status
                );
                persist(&self.store, &mut operation.record).await;
                self.schedule_dismiss(op);
                Some(TrackerUpdate::Succeeded(op))
            }
            NextStep::Failed(CloudError::Cancelled) => {
                // shutting down: leave the record running for the next session
                None
            }
            NextStep::Failed(err) => {
                let message = err.to_string();
                operation.record.mark_error(&message);
                operation.state = OperationState::Failed;
                operation.message = message.clone();
                persist(&self.store, &mut operation.record).await;
                self.schedule_dismiss(op);
                Some(TrackerUpdate::Failed(op, message))
            }
        }
    }

    fn spawn_poll(
        &self,
        op: OperationId,
        strategy: PollStrategy,
        action_id: String,
        server_id: String,
        delay: Duration,
    ) {
        let provider = self.provider.clone();
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let poll = async {
                match strategy {
                    PollStrategy::ByActionId => match provider.action_poller() {
                        Some(poller) => PollResult::Action(poller.poll_action(&action_id).await),
                        None => PollResult::Action(Err(CloudError::Unsupported(
                            "action polling".to_string(),
                        ))),
                    },
                    PollStrategy::ByServerStatus => {
                        PollResult::Server(provider.get_server(&server_id).await)
                    }
                }
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = poll => result,
            };
            let _ = tx.send(TrackerEvent::Polled { op, result });
        });
    }

    fn schedule_dismiss(&self, op: OperationId) {
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        let delay = self.config.dismiss_delay;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(TrackerEvent::Dismiss { op });
                }
            }
        });
    }

    fn allocate_id(&mut self) -> OperationId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn get(&self, op: OperationId) -> Option<&Operation> {
        self.operations.get(&op)
    }

    pub fn active_count(&self) -> usize {
        self.operations.values().filter(|op| op.is_active()).count()
    }

    /// Whether an active operation targets this server
    pub fn is_tracking(&self, server_id: &str) -> bool {
        self.operations
            .values()
            .any(|op| op.is_active() && op.record.server_id == server_id)
    }

    /// Stop all background tasks. Unfinished records stay `running`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for OperationTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Mirror an operation to its record; storage errors never stop the operation
async fn persist(store: &ActionStore, record: &mut ActionRecord) {
    if let Err(e) = store.save(record).await {
        tracing::warn!("Failed to persist action for {}: {}", record.server_id, e);
    }
}
