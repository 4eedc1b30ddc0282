#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use quire_commands::{
    Command, CommandFlag, CommandHeader, CommandId, ExecutionHooks, ExecutionLogger, Failure,
    GroupKey, Outcome, UndoGroupId,
};

/// Side effects observed by the test commands.
#[derive(Clone, Default)]
pub struct Journal {
    inner: Arc<JournalInner>,
}

#[derive(Default)]
struct JournalInner {
    entries: Mutex<Vec<String>>,
    total: AtomicI64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.inner.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.inner.entries.lock().unwrap().clone()
    }

    pub fn total(&self) -> i64 {
        self.inner.total.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Lets a test hold a command inside its `execute` body.
#[derive(Clone, Default)]
pub struct Gate {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

/// Records `exec`/`undo`/`redo` entries and adds/subtracts `amount` from the
/// journal total.
pub struct Record {
    header: CommandHeader,
    pub label: String,
    pub amount: i64,
    journal: Journal,
    fail_execute: bool,
    fail_undo: bool,
    panic_execute: bool,
    gate: Option<Gate>,
}

impl Record {
    pub fn new(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            header: CommandHeader::undoable(),
            label: label.into(),
            amount: 1,
            journal: journal.clone(),
            fail_execute: false,
            fail_undo: false,
            panic_execute: false,
            gate: None,
        }
    }

    pub fn id(&self) -> CommandId {
        self.header.id()
    }

    pub fn not_undoable(mut self) -> Self {
        self.header = CommandHeader::default().with_id(self.header.id());
        self
    }

    pub fn with_id(mut self, id: CommandId) -> Self {
        self.header = self.header.with_id(id);
        self
    }

    pub fn in_group(mut self, group: UndoGroupId) -> Self {
        self.header = self.header.with_undo_group(group);
        self
    }

    pub fn with_flag(mut self, flag: CommandFlag) -> Self {
        self.header = self.header.with_flag(flag);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn failing_undo(mut self) -> Self {
        self.fail_undo = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_execute = true;
        self
    }

    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }
}

#[async_trait]
impl Command for Record {
    fn header(&self) -> &CommandHeader {
        &self.header
    }

    fn name(&self) -> &'static str {
        "record"
    }

    async fn execute(&mut self) -> Outcome {
        self.journal.enter();
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        tokio::task::yield_now().await;
        self.journal.leave();

        if self.panic_execute {
            panic!("record {} exploded", self.label);
        }
        if self.fail_execute {
            self.journal.push(format!("fail {}", self.label));
            return Err(Failure::new(format!("record {} failed", self.label)));
        }
        self.journal.push(format!("exec {}", self.label));
        self.journal.inner.total.fetch_add(self.amount, Ordering::SeqCst);
        Ok(())
    }

    async fn undo(&mut self) -> Outcome {
        if self.fail_undo {
            return Err(Failure::new(format!("undo of {} failed", self.label)));
        }
        self.journal.push(format!("undo {}", self.label));
        self.journal.inner.total.fetch_sub(self.amount, Ordering::SeqCst);
        Ok(())
    }

    async fn redo(&mut self) -> Outcome {
        self.journal.push(format!("redo {}", self.label));
        self.journal.inner.total.fetch_add(self.amount, Ordering::SeqCst);
        Ok(())
    }
}

/// A second command type for type-scoped queue tests.
pub struct Marker {
    header: CommandHeader,
    journal: Journal,
}

impl Marker {
    pub fn new(journal: &Journal) -> Self {
        Self {
            header: CommandHeader::default(),
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl Command for Marker {
    fn header(&self) -> &CommandHeader {
        &self.header
    }

    async fn execute(&mut self) -> Outcome {
        self.journal.push("marker");
        Ok(())
    }
}

/// Counts hook invocations.
#[derive(Default)]
pub struct CountingHooks {
    pub refreshes: AtomicUsize,
    pub saves: AtomicUsize,
    pub flushes: AtomicUsize,
}

impl CountingHooks {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionHooks for CountingHooks {
    async fn refresh_resources(&self) -> Outcome {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_state(&self) -> Outcome {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush_pending_saves(&self, _elapsed: std::time::Duration) -> Outcome {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hooks that panic when asked to save or flush.
pub struct PanickingHooks;

#[async_trait]
impl ExecutionHooks for PanickingHooks {
    async fn save_state(&self) -> Outcome {
        panic!("save_state exploded");
    }

    async fn flush_pending_saves(&self, _elapsed: std::time::Duration) -> Outcome {
        panic!("flush exploded");
    }
}

/// A logger that panics on every failure it is handed.
pub struct PanickingLogger;

impl ExecutionLogger for PanickingLogger {
    fn command_failed(&self, _command_id: CommandId, _failure: &Failure) {
        panic!("logger exploded");
    }

    fn group_failed(&self, _group: GroupKey, _failure: &Failure) {
        panic!("logger exploded");
    }
}
