//! Blocking action orchestration
//!
//! `ActionService` initiates server actions, persists them as
//! [`ActionRecord`]s and waits for completion on the calling task, one poll
//! every interval, until the [`PollMachine`] reaches a terminal step or the
//! cancellation token fires.

use crate::action::{ActionCommand, ActionRecord};
use crate::error::{CloudError, Result};
use crate::machine::{NextStep, PollMachine, PollResult, PollStrategy, WaitConfig};
use crate::provider::{ActionHandle, CreateServerRequest, ServerProvider};
use crate::retry::{RetryConfig, is_retryable_default, retry_with_backoff};
use crate::store::ActionStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Snapshot handed to the progress callback after every poll
#[derive(Debug, Clone)]
pub struct PollTick {
    pub record_id: Option<u64>,
    pub server: String,
    pub attempt: u32,
    pub strategy: PollStrategy,
    pub confirming: bool,
    pub progress: Option<u8>,
    pub consecutive_errors: u32,
    pub message: String,
}

/// Outcome of resuming one persisted action
#[derive(Debug)]
pub struct ResumeOutcome {
    pub record: ActionRecord,
    pub result: Result<()>,
}

pub struct ActionService {
    provider: Arc<dyn ServerProvider>,
    store: Arc<ActionStore>,
    config: WaitConfig,
    retry: RetryConfig,
}

impl ActionService {
    pub fn new(
        provider: Arc<dyn ServerProvider>,
        store: Arc<ActionStore>,
        config: WaitConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &Arc<dyn ServerProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<ActionStore> {
        &self.store
    }

    /// Issue the provider call for `command` and persist the resulting record.
    /// Does not wait for completion.
    pub async fn initiate(
        &self,
        command: ActionCommand,
        server_id: &str,
        server_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(ActionRecord, ActionHandle)> {
        let provider = &self.provider;
        let request = move || async move {
            match command {
                ActionCommand::StartServer => provider.start_server(server_id).await,
                ActionCommand::StopServer => provider.stop_server(server_id).await,
                ActionCommand::CreateServer => Err(CloudError::Unsupported(
                    "create_server must go through ActionService::create_server".to_string(),
                )),
            }
        };
        let handle = retry_with_backoff(&self.retry, cancel, is_retryable_default, request).await?;

        tracing::info!(
            "{} {} accepted by {} (action '{}')",
            command,
            server_id,
            provider.name(),
            handle.action_id
        );

        let record = self.track(command, server_id, server_name, &handle).await;
        Ok((record, handle))
    }

    /// Persist a new record for an initial handle. Storage failures are
    /// logged and the unsaved record is returned.
    pub async fn track(
        &self,
        command: ActionCommand,
        server_id: &str,
        server_name: Option<&str>,
        handle: &ActionHandle,
    ) -> ActionRecord {
        let mut record = ActionRecord::new(self.provider.name(), server_id, command);
        if let Some(name) = server_name {
            record.server_name = Some(name.to_string());
        }
        record.apply_handle(handle);
        self.persist(&mut record).await;
        record
    }

    pub async fn start_server(
        &self,
        server_id: &str,
        server_name: Option<&str>,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<ActionRecord> {
        self.run(ActionCommand::StartServer, server_id, server_name, cancel, on_tick)
            .await
    }

    pub async fn stop_server(
        &self,
        server_id: &str,
        server_name: Option<&str>,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<ActionRecord> {
        self.run(ActionCommand::StopServer, server_id, server_name, cancel, on_tick)
            .await
    }

    async fn run(
        &self,
        command: ActionCommand,
        server_id: &str,
        server_name: Option<&str>,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<ActionRecord> {
        let (mut record, handle) = self.initiate(command, server_id, server_name, cancel).await?;
        self.wait_for_completion(&mut record, &handle, cancel, on_tick)
            .await?;
        Ok(record)
    }

    /// Create a server and wait until it is running. Creation is not
    /// idempotent, so the provider call is not retried.
    pub async fn create_server(
        &self,
        request: &CreateServerRequest,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<ActionRecord> {
        if cancel.is_cancelled() {
            return Err(CloudError::Cancelled);
        }

        let created = self.provider.create_server(request).await?;
        tracing::info!(
            "Server {} ({}) created on {}",
            created.server.name,
            created.server.id,
            self.provider.name()
        );

        let mut record = self
            .track(
                ActionCommand::CreateServer,
                &created.server.id,
                Some(&created.server.name),
                &created.handle,
            )
            .await;
        self.wait_for_completion(&mut record, &created.handle, cancel, on_tick)
            .await?;
        Ok(record)
    }

    /// Drive an initiated action to completion, persisting the record after
    /// every poll.
    ///
    /// Returns the failure cause as the error; the record is then marked
    /// `error`, except for [`CloudError::Cancelled`], which leaves it
    /// `running` for a later resume.
    pub async fn wait_for_completion(
        &self,
        record: &mut ActionRecord,
        handle: &ActionHandle,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<()> {
        let (machine, step) = PollMachine::start(
            self.config.clone(),
            handle,
            &record.target_status,
            self.provider.action_poller().is_some(),
        );
        self.drive(record, machine, step, cancel, on_tick).await
    }

    /// Replay the state machine for a persisted `running` record, polling by
    /// its stored action id without issuing a new provider call.
    pub async fn resume_action(
        &self,
        record: &mut ActionRecord,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<()> {
        if !record.is_running() {
            return Ok(());
        }

        tracing::info!(
            "Resuming {} #{} for {} (action '{}')",
            record.command,
            record.id.unwrap_or_default(),
            record.server_id,
            record.action_id
        );

        let (machine, step) = PollMachine::resume(
            self.config.clone(),
            &record.action_id,
            &record.target_status,
            self.provider.action_poller().is_some(),
        );
        self.drive(record, machine, step, cancel, on_tick).await
    }

    /// Resume every `running` record of this provider, one after another.
    /// Stops early (leaving the rest untouched) when cancelled.
    pub async fn resume_pending(
        &self,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<Vec<ResumeOutcome>> {
        let pending: Vec<ActionRecord> = self
            .store
            .list_pending()
            .await?
            .into_iter()
            .filter(|r| r.provider == self.provider.name())
            .collect();

        let mut outcomes = Vec::with_capacity(pending.len());
        for mut record in pending {
            let result = self.resume_action(&mut record, cancel, on_tick).await;
            let cancelled = matches!(result, Err(CloudError::Cancelled));
            outcomes.push(ResumeOutcome { record, result });
            if cancelled {
                break;
            }
        }
        Ok(outcomes)
    }

    async fn drive(
        &self,
        record: &mut ActionRecord,
        mut machine: PollMachine,
        mut step: NextStep,
        cancel: &CancellationToken,
        on_tick: &mut (dyn FnMut(&PollTick) + Send),
    ) -> Result<()> {
        loop {
            let (strategy, immediate) = match step {
                NextStep::Succeeded => {
                    record.mark_success();
                    self.persist(record).await;
                    return Ok(());
                }
                NextStep::Failed(CloudError::Cancelled) => return Err(CloudError::Cancelled),
                NextStep::Failed(err) => {
                    record.mark_error(err.to_string());
                    self.persist(record).await;
                    return Err(err);
                }
                NextStep::Poll {
                    strategy,
                    immediate,
                } => (strategy, immediate),
            };

            if cancel.is_cancelled() {
                return Err(CloudError::Cancelled);
            }
            if !immediate {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CloudError::Cancelled),
                    _ = tokio::time::sleep(machine.poll_interval()) => {}
                }
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CloudError::Cancelled),
                result = self.poll_once(strategy, machine.action_id(), &record.server_id) => result,
            };

            step = machine.on_result(result);

            if let Some(progress) = machine.progress() {
                record.set_progress(progress);
            }
            if !step.is_terminal() {
                self.persist(record).await;
            }

            on_tick(&PollTick {
                record_id: record.id,
                server: record.display_name().to_string(),
                attempt: machine.attempts(),
                strategy,
                confirming: machine.is_confirming(),
                progress: machine.progress(),
                consecutive_errors: machine.consecutive_errors(),
                message: machine.describe(),
            });
        }
    }

    async fn poll_once(
        &self,
        strategy: PollStrategy,
        action_id: &str,
        server_id: &str,
    ) -> PollResult {
        match strategy {
            PollStrategy::ByActionId => match self.provider.action_poller() {
                Some(poller) => PollResult::Action(poller.poll_action(action_id).await),
                None => PollResult::Action(Err(CloudError::Unsupported(
                    "action polling".to_string(),
                ))),
            },
            PollStrategy::ByServerStatus => {
                PollResult::Server(self.provider.get_server(server_id).await)
            }
        }
    }

    /// Best effort: a storage outage only costs the ability to resume
    async fn persist(&self, record: &mut ActionRecord) {
        if let Err(e) = self.store.save(record).await {
            tracing::warn!("Failed to persist action for {}: {}", record.server_id, e);
        }
    }
}
