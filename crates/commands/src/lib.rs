//! `quire-commands`: serialized, undoable command execution.
//!
//! - [`Command`]: the contract for a unit of user-initiated work
//! - [`CommandService`]: queues commands and runs them one at a time
//! - Undo/redo history with undo groups, driven through the same queue
//! - [`CommandRegistry`]: explicit kind -> constructor factory

pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod registry;
pub mod service;
pub mod undo;

mod queue;

pub use command::{Command, CommandHeader};
pub use config::CommandServiceConfig;
pub use error::CommandError;
pub use events::{CommandEvent, EventPhase, ExecutionMode};
pub use hooks::{ExecutionHooks, ExecutionLogger, NoopHooks, TracingLogger};
pub use registry::CommandRegistry;
pub use service::{CommandService, CommandServiceBuilder, ExecutorStats};
pub use undo::{GroupKey, HistoryOperation};

pub use quire_core::{
    CommandFlag, CommandFlags, CommandId, ExecutionSource, Failure, Outcome, OutcomeExt,
    UndoGroupId,
};
