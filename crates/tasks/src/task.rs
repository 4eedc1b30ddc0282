//! Background task contract.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use quire_core::Failure;

/// Why a task did not complete.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(Failure),

    /// The task observed its cancellation token and stopped early. Neither a
    /// success nor a failure.
    #[error("task was cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

impl From<Failure> for TaskError {
    fn from(failure: Failure) -> Self {
        TaskError::Failed(failure)
    }
}

/// A unit of background work. Tasks have no identity and are never undone.
///
/// Cancellation is cooperative: a long-running task should check `cancel` at
/// convenient points and return [`TaskError::Cancelled`].
#[async_trait]
pub trait Task: Send + 'static {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<(), TaskError>;
}

/// Task backed by a one-shot closure. Built with [`task_fn`].
pub struct FnTask<F> {
    name: &'static str,
    body: Option<F>,
}

/// Wrap an async closure as a [`Task`].
pub fn task_fn<F, Fut>(name: &'static str, body: F) -> FnTask<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    FnTask {
        name,
        body: Some(body),
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<(), TaskError> {
        match self.body.take() {
            Some(body) => body(cancel).await,
            None => Err(Failure::new(format!("task {} already ran", self.name)).into()),
        }
    }
}
