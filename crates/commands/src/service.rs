//! Serialized command executor.
//!
//! All queued work (commands and undo/redo requests) is processed by a single
//! worker task, one item at a time. The worker is spawned on the first enqueue
//! and exits when the queue runs dry; the next enqueue spawns it again.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, Notify, broadcast, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use quire_core::{CommandFlag, CommandFlags, CommandId, ExecutionSource, Failure, Outcome, UndoGroupId};

use crate::command::{Command, kind_of};
use crate::config::CommandServiceConfig;
use crate::error::CommandError;
use crate::events::{CommandEvent, EventPhase, ExecutionMode};
use crate::hooks::{ExecutionHooks, ExecutionLogger, NoopHooks, TracingLogger};
use crate::queue::{PendingQueue, QueueEntry};
use crate::registry::CommandRegistry;
use crate::undo::{ExecutedCommand, HistoryOperation, UndoGroup, UndoManager};

type CommandReply = oneshot::Sender<Result<(), CommandError>>;
type HistoryReply = oneshot::Sender<Result<bool, CommandError>>;

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorStats {
    pub commands_executed: u64,
    pub commands_failed: u64,
    pub commands_discarded: u64,
    pub groups_undone: u64,
    pub groups_redone: u64,
    pub history_failures: u64,
    pub pending: usize,
    pub running: bool,
}

struct QueuedCommand {
    command: Box<dyn Command>,
    source: ExecutionSource,
    reply: Option<CommandReply>,
}

/// One item on the executor queue.
enum Work {
    Command(QueuedCommand),
    History {
        operation: HistoryOperation,
        reply: HistoryReply,
    },
}

impl Work {
    fn refreshes_in_group(&self, group: UndoGroupId) -> bool {
        match self {
            Work::Command(queued) => {
                let header = queued.command.header();
                header.undo_group() == Some(group)
                    && header.flags().contains(CommandFlag::TriggersResourceRefresh)
            }
            Work::History { .. } => false,
        }
    }
}

impl QueueEntry for Work {
    fn command_id(&self) -> Option<CommandId> {
        match self {
            Work::Command(queued) => Some(queued.command.header().id()),
            Work::History { .. } => None,
        }
    }

    fn command_kind(&self) -> Option<std::any::TypeId> {
        match self {
            Work::Command(queued) => Some(kind_of(queued.command.as_ref())),
            Work::History { .. } => None,
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: PendingQueue<Work>,
    running: bool,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    config: CommandServiceConfig,
    registry: CommandRegistry,
    hooks: Arc<dyn ExecutionHooks>,
    logger: Arc<dyn ExecutionLogger>,
    state: Mutex<QueueState>,
    history: Mutex<UndoManager>,
    stats: Mutex<ExecutorStats>,
    wake: Notify,
    // Held for the whole of `stop` so concurrent callers wait for the same worker.
    stopping: AsyncMutex<()>,
    events: broadcast::Sender<CommandEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for [`CommandService`].
pub struct CommandServiceBuilder {
    config: CommandServiceConfig,
    registry: CommandRegistry,
    hooks: Arc<dyn ExecutionHooks>,
    logger: Arc<dyn ExecutionLogger>,
}

impl Default for CommandServiceBuilder {
    fn default() -> Self {
        Self {
            config: CommandServiceConfig::default(),
            registry: CommandRegistry::new(),
            hooks: Arc::new(NoopHooks),
            logger: Arc::new(TracingLogger),
        }
    }
}

impl CommandServiceBuilder {
    pub fn config(mut self, config: CommandServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ExecutionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn ExecutionLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> CommandService {
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        CommandService {
            shared: Arc::new(Shared {
                config: self.config,
                registry: self.registry,
                hooks: self.hooks,
                logger: self.logger,
                state: Mutex::new(QueueState::default()),
                history: Mutex::new(UndoManager::new()),
                stats: Mutex::new(ExecutorStats::default()),
                wake: Notify::new(),
                stopping: AsyncMutex::new(()),
                events,
            }),
        }
    }
}

/// Queues commands, runs them one at a time and keeps their undo history.
///
/// Cloning is cheap; clones share the same queue and history.
#[derive(Clone)]
pub struct CommandService {
    shared: Arc<Shared>,
}

impl Default for CommandService {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CommandService {
    pub fn builder() -> CommandServiceBuilder {
        CommandServiceBuilder::default()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.shared.registry
    }

    /// Queue a command to run as soon as the executor gets to it.
    #[track_caller]
    pub fn enqueue<C: Command>(&self, command: C) -> Result<CommandId, CommandError> {
        self.enqueue_delayed(command, Duration::ZERO)
    }

    /// Queue a command that must not start before `delay` has elapsed.
    #[track_caller]
    pub fn enqueue_delayed<C: Command>(
        &self,
        command: C,
        delay: Duration,
    ) -> Result<CommandId, CommandError> {
        let source = ExecutionSource::caller();
        self.shared.submit(Box::new(command), delay, source, None)
    }

    /// Queue an already boxed command.
    #[track_caller]
    pub fn enqueue_boxed(
        &self,
        command: Box<dyn Command>,
        delay: Duration,
    ) -> Result<CommandId, CommandError> {
        let source = ExecutionSource::caller();
        self.shared.submit(command, delay, source, None)
    }

    /// Build a command through the registry, configure it and queue it.
    #[track_caller]
    pub fn execute<C: Command>(
        &self,
        kind: &str,
        configure: impl FnOnce(&mut C),
    ) -> Result<CommandId, CommandError> {
        let source = ExecutionSource::caller();
        let command = self.shared.registry.create_with::<C>(kind, configure)?;
        self.shared
            .submit(Box::new(command), Duration::ZERO, source, None)
    }

    /// Build a command through the registry and queue it unconfigured.
    #[track_caller]
    pub fn execute_kind(&self, kind: &str) -> Result<CommandId, CommandError> {
        let source = ExecutionSource::caller();
        let command = self.shared.registry.create(kind)?;
        self.shared.submit(command, Duration::ZERO, source, None)
    }

    /// Queue a command and wait until it has run.
    ///
    /// The command is queued when this is called, not when the returned future
    /// is first polled.
    #[track_caller]
    pub fn execute_and_wait<C: Command>(
        &self,
        command: C,
    ) -> impl Future<Output = Result<(), CommandError>> + Send + use<C> {
        self.execute_and_wait_delayed(command, Duration::ZERO)
    }

    #[track_caller]
    pub fn execute_and_wait_delayed<C: Command>(
        &self,
        command: C,
        delay: Duration,
    ) -> impl Future<Output = Result<(), CommandError>> + Send + use<C> {
        let source = ExecutionSource::caller();
        let (tx, rx) = oneshot::channel();
        let submitted = self.shared.submit(Box::new(command), delay, source, Some(tx));
        async move {
            let command_id = submitted?;
            rx.await
                .unwrap_or(Err(CommandError::Discarded(command_id)))
        }
    }

    /// Run a command right away on the calling task, bypassing the queue.
    ///
    /// This may overlap with whatever the executor is running. The command is
    /// not recorded for undo and no post-execution hooks fire.
    #[track_caller]
    pub fn execute_immediate<C: Command>(
        &self,
        command: C,
    ) -> impl Future<Output = Result<(), CommandError>> + Send + use<C> {
        let source = ExecutionSource::caller();
        let shared = self.shared.clone();
        async move {
            let command: Box<dyn Command> = Box::new(command);
            let command_id = command.header().id();
            let started = CommandEvent::new(
                command_id,
                command.name(),
                ExecutionMode::Immediate,
                EventPhase::Started,
                source,
            );
            shared.started(&started);

            let outcome = match run_guarded(command, ExecutionMode::Immediate).await {
                Ran::Completed(_, outcome) => outcome,
                Ran::Panicked(failure) => Err(failure),
            };
            shared.publish(started.finished(outcome.is_ok()));
            outcome.map_err(|failure| shared.command_failed(command_id, failure))
        }
    }

    /// Remove every pending command of type `T`. The running command is not
    /// affected.
    pub fn remove_commands_of_type<T: Command>(&self) -> usize {
        let removed = lock(&self.shared.state)
            .pending
            .remove_kind(std::any::TypeId::of::<T>());
        let count = removed.len();
        if count > 0 {
            lock(&self.shared.stats).commands_discarded += count as u64;
            debug!(
                executor = %self.shared.config.name,
                command = std::any::type_name::<T>(),
                count,
                "removed pending commands"
            );
        }
        count
    }

    pub fn contains_commands_of_type<T: Command>(&self) -> bool {
        lock(&self.shared.state)
            .pending
            .contains_kind(std::any::TypeId::of::<T>())
    }

    /// Undo the most recent undo group.
    ///
    /// The request runs on the executor, after everything queued before it.
    pub async fn undo(&self) -> Result<(), CommandError> {
        match self.shared.request_history(HistoryOperation::Undo).await? {
            true => Ok(()),
            false => Err(CommandError::UndoStackEmpty),
        }
    }

    /// Redo the most recently undone group.
    pub async fn redo(&self) -> Result<(), CommandError> {
        match self.shared.request_history(HistoryOperation::Redo).await? {
            true => Ok(()),
            false => Err(CommandError::RedoStackEmpty),
        }
    }

    /// Like [`undo`](Self::undo), but an empty stack yields `Ok(false)`.
    pub async fn try_undo(&self) -> Result<bool, CommandError> {
        self.shared.request_history(HistoryOperation::Undo).await
    }

    /// Like [`redo`](Self::redo), but an empty stack yields `Ok(false)`.
    pub async fn try_redo(&self) -> Result<bool, CommandError> {
        self.shared.request_history(HistoryOperation::Redo).await
    }

    pub fn undo_count(&self) -> usize {
        lock(&self.shared.history).undo_count()
    }

    pub fn redo_count(&self) -> usize {
        lock(&self.shared.history).redo_count()
    }

    /// Forget all undo and redo history.
    pub fn clear_history(&self) {
        let cleared = lock(&self.shared.history).clear();
        drop(cleared);
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared.state).pending.len()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    /// Receive lifecycle events for commands started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.shared.events.subscribe()
    }

    pub fn stats(&self) -> ExecutorStats {
        let mut stats = lock(&self.shared.stats).clone();
        let state = lock(&self.shared.state);
        stats.pending = state.pending.len();
        stats.running = state.running;
        stats
    }

    /// Discard all pending work and wait for the worker to finish.
    ///
    /// A command already running completes and is recorded as usual. Callers
    /// waiting on discarded items receive [`CommandError::Discarded`] or
    /// [`CommandError::HistoryDiscarded`]. Returns the number of discarded
    /// items. Concurrent callers are serialized: each returns only once the
    /// worker it observed has finished. Must not be awaited from inside a
    /// command body.
    pub async fn stop(&self) -> usize {
        let _stopping = self.shared.stopping.lock().await;
        let (discarded, worker) = {
            let mut state = lock(&self.shared.state);
            (state.pending.drain(), state.worker.take())
        };
        let count = discarded.len();
        drop(discarded);

        if count > 0 {
            lock(&self.shared.stats).commands_discarded += count as u64;
        }
        self.shared.wake.notify_one();

        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(executor = %self.shared.config.name, error = %err, "command executor ended abnormally");
            }
        }

        info!(executor = %self.shared.config.name, discarded = count, "command executor stopped");
        count
    }
}

impl Shared {
    fn submit(
        self: &Arc<Self>,
        command: Box<dyn Command>,
        delay: Duration,
        source: ExecutionSource,
        reply: Option<CommandReply>,
    ) -> Result<CommandId, CommandError> {
        let command_id = command.header().id();
        let work = Work::Command(QueuedCommand {
            command,
            source,
            reply,
        });
        self.push_work(work, delay)?;
        debug!(executor = %self.config.name, command_id = %command_id, source = %source, "command queued");
        Ok(command_id)
    }

    fn push_work(self: &Arc<Self>, work: Work, delay: Duration) -> Result<(), CommandError> {
        let runtime = Handle::try_current().map_err(|_| CommandError::RuntimeUnavailable)?;

        let mut state = lock(&self.state);
        state
            .pending
            .push(work, Instant::now() + delay)
            .map_err(CommandError::DuplicateEnqueue)?;

        if state.running {
            self.wake.notify_one();
        } else {
            state.running = true;
            state.worker = Some(runtime.spawn(worker_loop(self.clone())));
        }
        Ok(())
    }

    async fn request_history(
        self: &Arc<Self>,
        operation: HistoryOperation,
    ) -> Result<bool, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.push_work(Work::History { operation, reply: tx }, Duration::ZERO)?;
        rx.await
            .unwrap_or(Err(CommandError::HistoryDiscarded(operation)))
    }

    fn publish(&self, event: CommandEvent) {
        // Sending only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }

    fn started(&self, event: &CommandEvent) {
        self.log_guarded("command_started", |logger| logger.command_started(event));
        self.publish(event.clone());
    }

    fn command_failed(&self, command_id: CommandId, failure: Failure) -> CommandError {
        self.log_guarded("command_failed", |logger| logger.command_failed(command_id, &failure));
        lock(&self.stats).commands_failed += 1;
        CommandError::Execution {
            command_id,
            failure,
        }
    }

    async fn process(&self, work: Work) {
        match work {
            Work::Command(queued) => self.run_command(queued).await,
            Work::History { operation, reply } => {
                let result = self.run_history(operation).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn run_command(&self, queued: QueuedCommand) {
        let QueuedCommand {
            command,
            source,
            reply,
        } = queued;
        let command_id = command.header().id();
        let started = CommandEvent::new(
            command_id,
            command.name(),
            ExecutionMode::Execute,
            EventPhase::Started,
            source,
        );
        self.started(&started);

        let result = match run_guarded(command, ExecutionMode::Execute).await {
            Ran::Completed(command, Ok(())) => {
                self.publish(started.finished(true));
                lock(&self.stats).commands_executed += 1;

                let flags = command.header().flags().clone();
                let group = command.header().undo_group();
                if command.header().is_undoable() {
                    let evicted = lock(&self.history).record(ExecutedCommand { command, source });
                    drop(evicted);
                }
                self.dispatch_hooks(&flags, group).await;
                Ok(())
            }
            Ran::Completed(_, Err(failure)) | Ran::Panicked(failure) => {
                self.publish(started.finished(false));
                Err(self.command_failed(command_id, failure))
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    /// Pop the top group of one stack, run it, and push it on the other.
    ///
    /// Returns `Ok(false)` if the stack was empty.
    async fn run_history(&self, operation: HistoryOperation) -> Result<bool, CommandError> {
        let popped = {
            let mut history = lock(&self.history);
            match operation {
                HistoryOperation::Undo => history.pop_undo(),
                HistoryOperation::Redo => history.pop_redo(),
            }
        };
        let Some(group) = popped else {
            return Ok(false);
        };

        let key = group.key();
        let group_id = group.id();
        let mode = match operation {
            HistoryOperation::Undo => ExecutionMode::Undo,
            HistoryOperation::Redo => ExecutionMode::Redo,
        };
        debug!(executor = %self.config.name, group = %key, members = group.len(), "{operation} started");

        let mut members = group.into_members();
        if operation == HistoryOperation::Undo {
            members.reverse();
        }

        let mut survivors = Vec::with_capacity(members.len());
        let mut failures = Vec::new();
        let mut flags = CommandFlags::empty();
        for ExecutedCommand { command, source } in members {
            let command_id = command.header().id();
            let started =
                CommandEvent::new(command_id, command.name(), mode, EventPhase::Started, source);
            self.started(&started);

            match run_guarded(command, mode).await {
                Ran::Completed(command, outcome) => {
                    self.publish(started.finished(outcome.is_ok()));
                    match outcome {
                        Ok(()) => flags.extend(command.header().flags().iter()),
                        Err(failure) => failures.push((command_id, failure)),
                    }
                    survivors.push(ExecutedCommand { command, source });
                }
                Ran::Panicked(failure) => {
                    self.publish(started.finished(false));
                    failures.push((command_id, failure));
                }
            }
        }

        // Keep execution order on both stacks.
        if operation == HistoryOperation::Undo {
            survivors.reverse();
        }
        if let Some(group) = UndoGroup::from_members(group_id, survivors) {
            let mut history = lock(&self.history);
            match operation {
                HistoryOperation::Undo => history.push_redo(group),
                HistoryOperation::Redo => history.push_undo(group),
            }
        }

        {
            let mut stats = lock(&self.stats);
            match operation {
                HistoryOperation::Undo => stats.groups_undone += 1,
                HistoryOperation::Redo => stats.groups_redone += 1,
            }
            if !failures.is_empty() {
                stats.history_failures += 1;
            }
        }

        self.dispatch_hooks(&flags, None).await;

        let merged = failures
            .iter()
            .map(|(_, failure)| failure.clone())
            .reduce(Failure::merge);
        match merged {
            None => Ok(true),
            Some(merged) => {
                let merged = merged.context(format!("{operation} of {key} failed"));
                self.log_guarded("group_failed", |logger| logger.group_failed(key, &merged));
                Err(CommandError::PartialFailure {
                    operation,
                    group: key,
                    failures,
                })
            }
        }
    }

    /// Post-execution side effects for the given flags.
    ///
    /// When `group` is set and another pending command of that group will
    /// refresh resources too, the refresh is left to that command.
    async fn dispatch_hooks(&self, flags: &CommandFlags, group: Option<UndoGroupId>) {
        if flags.contains(CommandFlag::TriggersResourceRefresh) {
            let deferred = match group {
                Some(group) => lock(&self.state)
                    .pending
                    .any(|work| work.refreshes_in_group(group)),
                None => false,
            };
            if !deferred {
                let hooks = self.hooks.clone();
                self.call_hook("refresh_resources", async move { hooks.refresh_resources().await })
                    .await;
            }
        }

        if flags.contains(CommandFlag::TriggersStateSave) {
            let hooks = self.hooks.clone();
            self.call_hook("save_state", async move { hooks.save_state().await }).await;
        }
    }

    async fn flush(&self, last_flush: &mut Instant) {
        let elapsed = last_flush.elapsed();
        *last_flush = Instant::now();
        let hooks = self.hooks.clone();
        self.call_hook("flush_pending_saves", async move {
            hooks.flush_pending_saves(elapsed).await
        })
        .await;
    }

    /// Run a hook on its own task. Errors and panics are logged, never propagated.
    async fn call_hook<F>(&self, hook: &'static str, call: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let outcome = match tokio::spawn(call).await {
            Ok(outcome) => outcome,
            Err(err) => Err(join_failure(err, hook)),
        };
        if let Err(failure) = outcome {
            warn!(executor = %self.config.name, hook, error = %failure, "execution hook failed");
        }
    }

    fn log_guarded(&self, call_name: &'static str, call: impl FnOnce(&dyn ExecutionLogger)) {
        let logger = self.logger.as_ref();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| call(logger))) {
            warn!(
                executor = %self.config.name,
                call = call_name,
                error = %panic_message(payload.as_ref()),
                "execution logger panicked"
            );
        }
    }
}

/// Clears `running` when the worker exits any way other than going idle, so
/// the next enqueue spawns a fresh worker.
struct RunningReset<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for RunningReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.shared.state).running = false;
        }
    }
}

enum Next {
    Run(Work),
    Sleep(Instant),
    Idle,
}

async fn worker_loop(shared: Arc<Shared>) {
    debug!(executor = %shared.config.name, "command executor started");
    let mut reset = RunningReset {
        shared: &shared,
        armed: true,
    };
    let mut last_flush = Instant::now();
    // Work ran since the last flush.
    let mut dirty = false;

    loop {
        let next = {
            let mut state = lock(&shared.state);
            match state.pending.pop_ready(Instant::now()) {
                Some(work) => Next::Run(work),
                None if dirty => match state.pending.next_ready_at() {
                    Some(at) => Next::Sleep(at),
                    None => Next::Idle,
                },
                None => match state.pending.next_ready_at() {
                    Some(at) => Next::Sleep(at),
                    None => {
                        state.running = false;
                        reset.armed = false;
                        break;
                    }
                },
            }
        };

        match next {
            Next::Run(work) => {
                shared.process(work).await;
                dirty = true;
                if last_flush.elapsed() >= shared.config.flush_interval {
                    shared.flush(&mut last_flush).await;
                    dirty = false;
                }
            }
            Next::Idle => {
                shared.flush(&mut last_flush).await;
                dirty = false;
            }
            Next::Sleep(at) => {
                if dirty {
                    shared.flush(&mut last_flush).await;
                    dirty = false;
                    continue;
                }
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }

    debug!(executor = %shared.config.name, "command executor idle");
}

enum Ran {
    Completed(Box<dyn Command>, Outcome),
    Panicked(Failure),
}

/// Run one command body on its own task so a panic is reported as a failure
/// instead of tearing down the executor.
async fn run_guarded(mut command: Box<dyn Command>, mode: ExecutionMode) -> Ran {
    let joined = tokio::spawn(async move {
        let outcome = match mode {
            ExecutionMode::Execute | ExecutionMode::Immediate => command.execute().await,
            ExecutionMode::Undo => command.undo().await,
            ExecutionMode::Redo => command.redo().await,
        };
        (command, outcome)
    })
    .await;

    match joined {
        Ok((command, outcome)) => Ran::Completed(command, outcome),
        Err(err) => Ran::Panicked(join_failure(err, "command")),
    }
}

fn join_failure(err: JoinError, what: &str) -> Failure {
    if err.is_cancelled() {
        return Failure::new(format!("{what} task was cancelled"));
    }
    let payload = err.into_panic();
    Failure::new(format!("{what} panicked: {}", panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
