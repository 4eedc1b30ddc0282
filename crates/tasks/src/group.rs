//! Task groups and their progress reporting.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use quire_core::{Failure, TaskGroupId};

use crate::task::Task;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Tasks run one after another; the first failure abandons the rest.
    Serial,
    /// Tasks run concurrently; failures do not affect siblings.
    Parallel,
}

/// An ordered batch of tasks submitted to the scheduler together.
pub struct TaskGroup {
    id: TaskGroupId,
    kind: GroupKind,
    tasks: Vec<Box<dyn Task>>,
    cancel: CancellationToken,
}

impl TaskGroup {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            id: TaskGroupId::new(),
            kind,
            tasks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn serial(tasks: Vec<Box<dyn Task>>) -> Self {
        Self {
            tasks,
            ..Self::new(GroupKind::Serial)
        }
    }

    pub fn parallel(tasks: Vec<Box<dyn Task>>) -> Self {
        Self {
            tasks,
            ..Self::new(GroupKind::Parallel)
        }
    }

    /// Append a task.
    pub fn with_task(mut self, task: impl Task) -> Self {
        self.tasks.push(Box::new(task));
        self
    }

    /// Use a caller-owned token, e.g. a child of an application-wide one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> TaskGroupId {
        self.id
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn into_parts(self) -> (TaskGroupId, GroupKind, Vec<Box<dyn Task>>, CancellationToken) {
        (self.id, self.kind, self.tasks, self.cancel)
    }
}

impl core::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Sent once per task that completed, failed or was cancelled.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub group: TaskGroupId,
    /// Position of the task in its group.
    pub index: usize,
    pub total: usize,
    pub name: &'static str,
    pub status: TaskStatus,
    pub failure: Option<Failure>,
}

/// Final tally for a group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group: TaskGroupId,
    pub kind: GroupKind,
    pub total: usize,
    pub succeeded: usize,
    pub cancelled: usize,
    /// Failed tasks by index.
    pub failures: Vec<(usize, Failure)>,
}

impl GroupReport {
    pub(crate) fn new(group: TaskGroupId, kind: GroupKind, total: usize) -> Self {
        Self {
            group,
            kind,
            total,
            succeeded: 0,
            cancelled: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.succeeded == self.total
    }
}
