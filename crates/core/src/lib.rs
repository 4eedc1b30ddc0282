//! `quire-core`: building blocks shared by the command engine and the task scheduler.
//!
//! This crate has no runtime concerns: identifiers, capability flags, call-site
//! provenance and the [`Failure`] result model.

pub mod error;
pub mod flags;
pub mod id;
pub mod source;

pub use error::{ErrorEntry, Failure, Outcome, OutcomeExt};
pub use flags::{CommandFlag, CommandFlags};
pub use id::{CommandId, IdParseError, TaskGroupId, UndoGroupId};
pub use source::ExecutionSource;
