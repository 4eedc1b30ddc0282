//! Command factory: kind key -> constructor.
//!
//! The owning module registers a constructor for each command kind at startup.
//! Constructors capture whatever collaborators their commands need, so command
//! bodies never look services up at runtime.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::command::Command;
use crate::error::CommandError;

type TypedConstructor<C> = Arc<dyn Fn() -> C + Send + Sync>;
type ErasedConstructor = Box<dyn Fn() -> Box<dyn Command> + Send + Sync>;

struct Registration {
    type_name: &'static str,
    // Holds a `TypedConstructor<C>` for the registered `C`.
    typed: Box<dyn Any + Send + Sync>,
    erased: ErasedConstructor,
}

/// Maps command-kind keys to constructors.
#[derive(Default)]
pub struct CommandRegistry {
    constructors: HashMap<String, Registration>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for a command kind, replacing any previous one.
    pub fn register<C, F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        C: Command,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let kind = kind.into();
        let typed: TypedConstructor<C> = Arc::new(constructor);
        let erased_ctor = typed.clone();
        let registration = Registration {
            type_name: std::any::type_name::<C>(),
            typed: Box::new(typed),
            erased: Box::new(move || Box::new(erased_ctor()) as Box<dyn Command>),
        };

        if self.constructors.insert(kind.clone(), registration).is_some() {
            warn!(kind = %kind, "command constructor replaced");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<C, F>(mut self, kind: impl Into<String>, constructor: F) -> Self
    where
        C: Command,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.register(kind, constructor);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a command of the given kind without configuring it.
    pub fn create(&self, kind: &str) -> Result<Box<dyn Command>, CommandError> {
        let registration = self.registration(kind)?;
        Ok((registration.erased)())
    }

    /// Build a command of the given kind as its concrete type and configure it.
    pub fn create_with<C>(
        &self,
        kind: &str,
        configure: impl FnOnce(&mut C),
    ) -> Result<C, CommandError>
    where
        C: Command,
    {
        let registration = self.registration(kind)?;
        let constructor = registration
            .typed
            .downcast_ref::<TypedConstructor<C>>()
            .ok_or_else(|| CommandError::CommandKindMismatch {
                kind: kind.to_string(),
                registered: registration.type_name,
                requested: std::any::type_name::<C>(),
            })?;

        let mut command = constructor();
        configure(&mut command);
        Ok(command)
    }

    fn registration(&self, kind: &str) -> Result<&Registration, CommandError> {
        self.constructors
            .get(kind)
            .ok_or_else(|| CommandError::UnknownCommandKind(kind.to_string()))
    }
}

impl core::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
