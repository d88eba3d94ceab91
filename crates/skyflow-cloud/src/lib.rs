//! SkyFlow Cloud Operations
//!
//! Provider abstraction and lifecycle tracking for asynchronous cloud server
//! actions (start, stop, create).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   SkyFlow CLI                    │
//! │       (sky server / sky action / sky watch)      │
//! └────────────┬───────────────────────┬────────────┘
//!              │                       │
//! ┌────────────▼───────────┐ ┌─────────▼────────────┐
//! │     ActionService      │ │   OperationTracker   │
//! │  (wait on the caller)  │ │ (many ops, events)   │
//! └────────────┬───────────┘ └─────────┬────────────┘
//!              │      PollMachine      │
//!              └───────────┬───────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────┐
//! │  trait ServerProvider   │   ActionStore (JSON)  │
//! └────────────┬────────────────────────────────────┘
//!              │
//! ┌────────────▼───────────┐
//! │  sakura-cloud provider │
//! └────────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod machine;
#[cfg(feature = "test-utils")]
pub mod mock;
pub mod provider;
pub mod retry;
pub mod service;
pub mod store;
pub mod tracker;

// Re-exports
pub use action::{ActionCommand, ActionRecord, ActionStatus};
pub use error::{CloudError, Result};
pub use machine::{NextStep, PollMachine, PollResult, PollStrategy, WaitConfig};
pub use provider::{
    ActionHandle, ActionPoller, CreateServerRequest, CreatedServer, HandleStatus, STATUS_OFF,
    STATUS_RUNNING, ServerInfo, ServerProvider,
};
pub use retry::{RetryConfig, retry_with_backoff};
pub use service::{ActionService, PollTick, ResumeOutcome};
pub use store::{ActionStore, STORE_FILE};
pub use tracker::{
    Operation, OperationId, OperationState, OperationTracker, TrackerConfig, TrackerEvent,
    TrackerUpdate,
};
