//! Command engine error model.

use thiserror::Error;

use quire_core::{CommandId, Failure};

use crate::undo::{GroupKey, HistoryOperation};

/// Errors reported by the [`CommandService`](crate::CommandService).
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// A command with the same id is already waiting in the queue.
    #[error("command {0} is already in the execution queue")]
    DuplicateEnqueue(CommandId),

    /// The command ran and returned (or panicked with) a failure.
    #[error("command {command_id} failed: {failure}")]
    Execution {
        command_id: CommandId,
        failure: Failure,
    },

    #[error("undo stack is empty")]
    UndoStackEmpty,

    #[error("redo stack is empty")]
    RedoStackEmpty,

    /// One or more members of an undo group failed. The group was still moved
    /// to the opposite stack.
    #[error("{operation} of group {group} partially failed ({} command(s))", .failures.len())]
    PartialFailure {
        operation: HistoryOperation,
        group: GroupKey,
        failures: Vec<(CommandId, Failure)>,
    },

    /// The command was removed or drained before it started.
    #[error("command {0} was discarded before execution")]
    Discarded(CommandId),

    /// A pending undo/redo request was drained before it ran. History is
    /// untouched.
    #[error("{0} request was discarded before execution")]
    HistoryDiscarded(HistoryOperation),

    #[error("no command registered for kind '{0}'")]
    UnknownCommandKind(String),

    #[error("command kind '{kind}' builds {registered}, not {requested}")]
    CommandKindMismatch {
        kind: String,
        registered: &'static str,
        requested: &'static str,
    },

    /// Commands can only be queued from inside a tokio runtime.
    #[error("no tokio runtime available to run the command executor")]
    RuntimeUnavailable,
}

impl CommandError {
    /// The failure behind an execution error, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            CommandError::Execution { failure, .. } => Some(failure),
            _ => None,
        }
    }
}
