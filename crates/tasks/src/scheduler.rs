//! Task scheduler: runs task groups one at a time, in submission order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quire_core::{Failure, TaskGroupId};

use crate::group::{GroupKind, GroupReport, TaskGroup, TaskProgress, TaskStatus};
use crate::task::{Task, TaskError};

#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("task scheduler is shut down")]
    ShutDown,
}

/// Task scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name for logging
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "task-scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub groups_completed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub uptime_secs: u64,
}

type GroupResult = Result<GroupReport, TaskError>;

struct Scheduled {
    group: TaskGroup,
    progress: mpsc::UnboundedSender<TaskProgress>,
    done: oneshot::Sender<GroupResult>,
}

/// Caller's view of a submitted group.
#[derive(Debug)]
pub struct TaskGroupHandle {
    id: TaskGroupId,
    cancel: CancellationToken,
    progress: mpsc::UnboundedReceiver<TaskProgress>,
    done: oneshot::Receiver<GroupResult>,
}

impl TaskGroupHandle {
    pub fn id(&self) -> TaskGroupId {
        self.id
    }

    /// Request cooperative cancellation of the group.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next progress message, or `None` once the group has finished and all
    /// messages were read.
    pub async fn progress(&mut self) -> Option<TaskProgress> {
        self.progress.recv().await
    }

    /// Wait for the group to finish.
    ///
    /// A serial group returns the first task failure (or `Cancelled`) as an
    /// error. A parallel group always returns its report; failed tasks are
    /// listed in [`GroupReport::failures`] and cancellation shows up in
    /// [`GroupReport::cancelled`].
    pub async fn wait(self) -> GroupResult {
        self.done.await.unwrap_or_else(|_| {
            Err(TaskError::Failed(Failure::new(
                "task scheduler dropped the group before it finished",
            )))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    name: String,
    queue: Mutex<Option<mpsc::UnboundedSender<Scheduled>>>,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

/// Runs [`TaskGroup`]s on a single background worker.
///
/// Groups never overlap: the next group starts only after the previous one has
/// finished. Cloning is cheap; clones share the worker.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    /// Spawn the scheduler worker on the current tokio runtime.
    pub fn spawn(config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let join = tokio::spawn(scheduler_loop(config.name.clone(), rx, stats.clone()));

        Self {
            inner: Arc::new(Inner {
                name: config.name,
                queue: Mutex::new(Some(tx)),
                join: tokio::sync::Mutex::new(Some(join)),
                stats,
            }),
        }
    }

    /// Run a single task as a one-element serial group.
    pub fn schedule_task(&self, task: impl Task) -> Result<TaskGroupHandle, SchedulerError> {
        self.schedule(TaskGroup::new(GroupKind::Serial).with_task(task))
    }

    pub fn schedule_serial_tasks(
        &self,
        tasks: Vec<Box<dyn Task>>,
    ) -> Result<TaskGroupHandle, SchedulerError> {
        self.schedule(TaskGroup::serial(tasks))
    }

    pub fn schedule_parallel_tasks(
        &self,
        tasks: Vec<Box<dyn Task>>,
    ) -> Result<TaskGroupHandle, SchedulerError> {
        self.schedule(TaskGroup::parallel(tasks))
    }

    /// Queue a prebuilt group behind everything already scheduled.
    pub fn schedule(&self, group: TaskGroup) -> Result<TaskGroupHandle, SchedulerError> {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let handle = TaskGroupHandle {
            id: group.id(),
            cancel: group.cancellation_token().clone(),
            progress: progress_rx,
            done: done_rx,
        };
        debug!(scheduler = %self.inner.name, group_id = %group.id(), kind = ?group.kind(), tasks = group.len(), "task group scheduled");

        let queue = lock(&self.inner.queue);
        let sender = queue.as_ref().ok_or(SchedulerError::ShutDown)?;
        sender
            .send(Scheduled {
                group,
                progress: progress_tx,
                done: done_tx,
            })
            .map_err(|_| SchedulerError::ShutDown)?;
        Ok(handle)
    }

    /// Stop accepting groups and wait until every queued group has run.
    pub async fn shutdown(&self) {
        lock(&self.inner.queue).take();
        let join = self.inner.join.lock().await.take();
        if let Some(join) = join {
            if let Err(err) = join.await {
                warn!(scheduler = %self.inner.name, error = %err, "task scheduler ended abnormally");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.inner.queue).is_none()
    }

    pub fn stats(&self) -> SchedulerStats {
        lock(&self.inner.stats).clone()
    }
}

async fn scheduler_loop(
    name: String,
    mut rx: mpsc::UnboundedReceiver<Scheduled>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    info!(scheduler = %name, "task scheduler started");
    let start_time = Instant::now();

    while let Some(Scheduled {
        group,
        progress,
        done,
    }) = rx.recv().await
    {
        let (id, kind, tasks, cancel) = group.into_parts();
        let mut report = GroupReport::new(id, kind, tasks.len());
        let reporter = Reporter {
            group: id,
            total: tasks.len(),
            progress,
        };

        let result = match kind {
            GroupKind::Serial => run_serial(tasks, &cancel, &reporter, &mut report).await,
            GroupKind::Parallel => {
                run_parallel(tasks, &cancel, &reporter, &mut report).await;
                Ok(())
            }
        };

        {
            let mut s = lock(&stats);
            s.groups_completed += 1;
            s.tasks_succeeded += report.succeeded as u64;
            s.tasks_failed += report.failures.len() as u64;
            s.tasks_cancelled += report.cancelled as u64;
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match &result {
            Ok(()) => debug!(scheduler = %name, group_id = %id, succeeded = report.succeeded, failed = report.failures.len(), "task group finished"),
            Err(err) => warn!(scheduler = %name, group_id = %id, error = %err, "task group aborted"),
        }

        // The caller may have dropped its handle.
        let _ = done.send(result.map(|()| report));
    }

    info!(scheduler = %name, "task scheduler stopped");
}

struct Reporter {
    group: TaskGroupId,
    total: usize,
    progress: mpsc::UnboundedSender<TaskProgress>,
}

impl Reporter {
    fn send(&self, index: usize, name: &'static str, outcome: &Result<(), TaskError>) {
        let (status, failure) = match outcome {
            Ok(()) => (TaskStatus::Succeeded, None),
            Err(TaskError::Cancelled) => (TaskStatus::Cancelled, None),
            Err(TaskError::Failed(failure)) => (TaskStatus::Failed, Some(failure.clone())),
        };
        // The caller may have dropped its handle.
        let _ = self.progress.send(TaskProgress {
            group: self.group,
            index,
            total: self.total,
            name,
            status,
            failure,
        });
    }
}

/// Run tasks in order, stopping at the first failure or cancellation.
async fn run_serial(
    tasks: Vec<Box<dyn Task>>,
    cancel: &CancellationToken,
    reporter: &Reporter,
    report: &mut GroupReport,
) -> Result<(), TaskError> {
    for (index, task) in tasks.into_iter().enumerate() {
        let name = task.name();
        let outcome = if cancel.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            run_guarded(task, cancel.clone()).await
        };
        reporter.send(index, name, &outcome);

        match outcome {
            Ok(()) => report.succeeded += 1,
            Err(TaskError::Cancelled) => {
                report.cancelled += 1;
                return Err(TaskError::Cancelled);
            }
            Err(TaskError::Failed(failure)) => {
                report.failures.push((index, failure.clone()));
                return Err(TaskError::Failed(
                    failure.context(format!("task {index} ({name}) failed")),
                ));
            }
        }
    }
    Ok(())
}

/// Run all tasks concurrently and wait for every one of them.
async fn run_parallel(
    tasks: Vec<Box<dyn Task>>,
    cancel: &CancellationToken,
    reporter: &Reporter,
    report: &mut GroupReport,
) {
    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        let cancel = cancel.clone();
        set.spawn(async move {
            let name = task.name();
            (index, name, run_guarded(task, cancel).await)
        });
    }

    while let Some(joined) = set.join_next().await {
        let (index, name, outcome) = match joined {
            Ok(done) => done,
            Err(err) => {
                warn!(error = %err, "parallel task wrapper failed");
                continue;
            }
        };
        reporter.send(index, name, &outcome);
        match outcome {
            Ok(()) => report.succeeded += 1,
            Err(TaskError::Cancelled) => report.cancelled += 1,
            Err(TaskError::Failed(failure)) => report.failures.push((index, failure)),
        }
    }
    report.failures.sort_by_key(|(index, _)| *index);
}

/// Run a task on its own tokio task so a panic becomes a failure.
async fn run_guarded(mut task: Box<dyn Task>, cancel: CancellationToken) -> Result<(), TaskError> {
    match tokio::spawn(async move { task.run(cancel).await }).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => Err(Failure::new("task panicked").into()),
        Err(_) => Err(TaskError::Cancelled),
    }
}
