//! Scripted in-memory provider for tests
//!
//! Responses queued with the `push_*` methods are returned in order; when a
//! queue is empty the provider answers from its server table.

use crate::error::{CloudError, Result};
use crate::provider::{
    ActionHandle, ActionPoller, CreateServerRequest, CreatedServer, STATUS_OFF, ServerInfo,
    ServerProvider,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Number of calls received per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub start: u32,
    pub stop: u32,
    pub create: u32,
    pub poll_action: u32,
    pub get_server: u32,
}

#[derive(Default)]
struct MockState {
    servers: HashMap<String, ServerInfo>,
    start_handles: VecDeque<Result<ActionHandle>>,
    stop_handles: VecDeque<Result<ActionHandle>>,
    action_polls: VecDeque<Result<ActionHandle>>,
    server_polls: VecDeque<Result<ServerInfo>>,
    calls: MockCalls,
    next_action: u32,
}

pub struct MockProvider {
    name: String,
    supports_actions: bool,
    state: Mutex<MockState>,
}

impl MockProvider {
    /// Provider with the action-polling capability
    pub fn with_actions() -> Self {
        Self::new("mock", true)
    }

    /// Provider without the action-polling capability
    pub fn without_actions() -> Self {
        Self::new("mock", false)
    }

    pub fn new(name: impl Into<String>, supports_actions: bool) -> Self {
        Self {
            name: name.into(),
            supports_actions,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // a panicking test thread must not hide the original failure
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_server(&self, id: &str, name: &str, status: &str) {
        self.state()
            .servers
            .insert(id.to_string(), ServerInfo::new(id, name, status));
    }

    pub fn set_status(&self, id: &str, status: &str) {
        if let Some(server) = self.state().servers.get_mut(id) {
            server.status = status.to_string();
        }
    }

    pub fn push_start_handle(&self, handle: Result<ActionHandle>) {
        self.state().start_handles.push_back(handle);
    }

    pub fn push_stop_handle(&self, handle: Result<ActionHandle>) {
        self.state().stop_handles.push_back(handle);
    }

    pub fn push_action_poll(&self, result: Result<ActionHandle>) {
        self.state().action_polls.push_back(result);
    }

    pub fn push_server_poll(&self, result: Result<ServerInfo>) {
        self.state().server_polls.push_back(result);
    }

    pub fn calls(&self) -> MockCalls {
        self.state().calls
    }

    fn default_handle(&self, state: &mut MockState) -> ActionHandle {
        if self.supports_actions {
            state.next_action += 1;
            ActionHandle::running(format!("act-{}", state.next_action))
        } else {
            ActionHandle::running("")
        }
    }
}

#[async_trait]
impl ServerProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_server(&self, id: &str) -> Result<ActionHandle> {
        let mut state = self.state();
        state.calls.start += 1;
        if !state.servers.contains_key(id) {
            return Err(CloudError::NotFound(id.to_string()));
        }
        match state.start_handles.pop_front() {
            Some(scripted) => scripted,
            None => Ok(self.default_handle(&mut state)),
        }
    }

    async fn stop_server(&self, id: &str) -> Result<ActionHandle> {
        let mut state = self.state();
        state.calls.stop += 1;
        if !state.servers.contains_key(id) {
            return Err(CloudError::NotFound(id.to_string()));
        }
        match state.stop_handles.pop_front() {
            Some(scripted) => scripted,
            None => Ok(self.default_handle(&mut state)),
        }
    }

    async fn get_server(&self, id: &str) -> Result<ServerInfo> {
        let mut state = self.state();
        state.calls.get_server += 1;
        if let Some(scripted) = state.server_polls.pop_front() {
            return scripted;
        }
        state
            .servers
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(id.to_string()))
    }

    async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        let mut servers: Vec<ServerInfo> = self.state().servers.values().cloned().collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(servers)
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<CreatedServer> {
        let mut state = self.state();
        state.calls.create += 1;
        let id = format!("srv-{}", state.servers.len() + 1);
        let server = ServerInfo::new(&id, &request.name, STATUS_OFF);
        state.servers.insert(id, server.clone());
        let handle = self.default_handle(&mut state);
        Ok(CreatedServer { server, handle })
    }

    fn action_poller(&self) -> Option<&dyn ActionPoller> {
        if self.supports_actions {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ActionPoller for MockProvider {
    async fn poll_action(&self, action_id: &str) -> Result<ActionHandle> {
        let mut state = self.state();
        state.calls.poll_action += 1;
        match state.action_polls.pop_front() {
            Some(scripted) => scripted,
            None => Ok(ActionHandle::running(action_id)),
        }
    }
}

/// Convenience for scripting a server poll result
pub fn server_with_status(id: &str, status: &str) -> ServerInfo {
    ServerInfo::new(id, id, status)
}
