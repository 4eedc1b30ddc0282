//! The command contract implemented by collaborators.
//!
//! A command is a unit of user-initiated work. The engine owns it as a
//! `Box<dyn Command>` from the moment it is submitted: it moves from the
//! pending queue to the undo stack, from there to the redo stack and back,
//! and is dropped when it leaves history. Because ownership moves, a command
//! can never sit in two of those places at once.
//!
//! Commands receive their collaborators at construction time (usually from a
//! constructor registered in the [`CommandRegistry`](crate::CommandRegistry)),
//! never from ambient global state.

use std::any::{Any, TypeId};

use async_trait::async_trait;

use quire_core::{CommandFlag, CommandFlags, CommandId, Failure, Outcome, UndoGroupId};

/// Identity, grouping and capabilities of a command.
///
/// Embed one of these in each command type and return it from
/// [`Command::header`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    id: CommandId,
    undo_group: Option<UndoGroupId>,
    flags: CommandFlags,
}

impl CommandHeader {
    /// New header with a fresh id and the given flags.
    pub fn new(flags: CommandFlags) -> Self {
        Self {
            id: CommandId::new(),
            undo_group: None,
            flags,
        }
    }

    /// New header for a plain undoable command.
    pub fn undoable() -> Self {
        Self::new(CommandFlags::undoable())
    }

    /// Use an explicit id (tests, or commands rebuilt from a log).
    pub fn with_id(mut self, id: CommandId) -> Self {
        self.id = id;
        self
    }

    pub fn with_undo_group(mut self, group: UndoGroupId) -> Self {
        self.undo_group = Some(group);
        self
    }

    pub fn with_flag(mut self, flag: CommandFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn set_undo_group(&mut self, group: Option<UndoGroupId>) {
        self.undo_group = group;
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn undo_group(&self) -> Option<UndoGroupId> {
        self.undo_group
    }

    pub fn flags(&self) -> &CommandFlags {
        &self.flags
    }

    pub fn is_undoable(&self) -> bool {
        self.flags.contains(CommandFlag::Undoable)
    }
}

impl Default for CommandHeader {
    fn default() -> Self {
        Self::new(CommandFlags::empty())
    }
}

/// A unit of work executed by the [`CommandService`](crate::CommandService).
///
/// `execute`, `undo` and `redo` may await I/O. The executor awaits each call to
/// completion before starting any other command, so a command body never
/// observes another command running concurrently (except one submitted through
/// [`execute_immediate`](crate::CommandService::execute_immediate)).
#[async_trait]
pub trait Command: Any + Send + Sync {
    fn header(&self) -> &CommandHeader;

    /// Short name used in logs and lifecycle events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn execute(&mut self) -> Outcome;

    /// Reverse the effect of a previous `execute`.
    ///
    /// Only called for commands flagged [`CommandFlag::Undoable`].
    async fn undo(&mut self) -> Outcome {
        Err(Failure::new(format!("{} does not support undo", self.name())))
    }

    /// Re-apply the command after an undo. Defaults to running `execute` again.
    async fn redo(&mut self) -> Outcome {
        self.execute().await
    }
}

/// Concrete type of a boxed command, used for type-scoped queue queries.
pub(crate) fn kind_of(command: &dyn Command) -> TypeId {
    (*command).type_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rename {
        header: CommandHeader,
    }

    #[async_trait]
    impl Command for Rename {
        fn header(&self) -> &CommandHeader {
            &self.header
        }

        async fn execute(&mut self) -> Outcome {
            Ok(())
        }
    }

    struct Delete {
        header: CommandHeader,
    }

    #[async_trait]
    impl Command for Delete {
        fn header(&self) -> &CommandHeader {
            &self.header
        }

        fn name(&self) -> &'static str {
            "delete"
        }

        async fn execute(&mut self) -> Outcome {
            Ok(())
        }
    }

    #[test]
    fn kind_of_sees_through_the_box() {
        let boxed: Box<dyn Command> = Box::new(Rename {
            header: CommandHeader::undoable(),
        });

        assert_eq!(kind_of(boxed.as_ref()), TypeId::of::<Rename>());
        assert_ne!(kind_of(boxed.as_ref()), TypeId::of::<Delete>());
    }

    #[test]
    fn header_builders_compose() {
        let group = UndoGroupId::new();
        let header = CommandHeader::undoable()
            .with_undo_group(group)
            .with_flag(CommandFlag::TriggersStateSave);

        assert!(header.is_undoable());
        assert_eq!(header.undo_group(), Some(group));
        assert!(header.flags().contains(CommandFlag::TriggersStateSave));
    }

    #[tokio::test]
    async fn default_undo_fails_and_default_redo_executes() {
        let mut command = Delete {
            header: CommandHeader::default(),
        };

        let err = command.undo().await.unwrap_err();
        assert_eq!(err.message(), "delete does not support undo");
        assert!(command.redo().await.is_ok());
    }

    #[test]
    fn default_name_is_the_type_name() {
        let command = Rename {
            header: CommandHeader::default(),
        };
        assert!(command.name().ends_with("Rename"));
    }
}
