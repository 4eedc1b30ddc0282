//! Collaborators the executor calls out to.
//!
//! The engine only decides *when* to refresh resources, save state or log a
//! failure. What those actions do belongs to the host application.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use quire_core::{CommandId, Failure, Outcome};

use crate::events::CommandEvent;
use crate::undo::GroupKey;

/// Side effects dispatched after successful command execution.
///
/// All methods default to doing nothing.
#[async_trait]
pub trait ExecutionHooks: Send + Sync {
    /// Called after a command flagged `TriggersResourceRefresh` succeeds.
    async fn refresh_resources(&self) -> Outcome {
        Ok(())
    }

    /// Called after a command flagged `TriggersStateSave` succeeds.
    async fn save_state(&self) -> Outcome {
        Ok(())
    }

    /// Called between commands, at most once per flush interval, and once more
    /// when the executor goes idle. No command is running during the call.
    async fn flush_pending_saves(&self, elapsed: Duration) -> Outcome {
        let _ = elapsed;
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ExecutionHooks for NoopHooks {}

/// Receives failures the executor recovered from.
pub trait ExecutionLogger: Send + Sync {
    fn command_failed(&self, command_id: CommandId, failure: &Failure);

    fn group_failed(&self, group: GroupKey, failure: &Failure);

    /// A command is about to run.
    fn command_started(&self, event: &CommandEvent) {
        let _ = event;
    }
}

/// Logger writing through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ExecutionLogger for TracingLogger {
    fn command_failed(&self, command_id: CommandId, failure: &Failure) {
        error!(command_id = %command_id, error = %failure, "command failed");
    }

    fn group_failed(&self, group: GroupKey, failure: &Failure) {
        error!(group = %group, error = %failure, "undo group failed");
    }

    fn command_started(&self, event: &CommandEvent) {
        debug!(event = %event.to_json(), "command started");
    }
}
