//! Deferring operator calls to a task queue.
//!
//! An operator in async mode packages its whole completion pipeline as a [`UnitOfWork`]
//! and submits it to a [`TaskQueue`]. The caller gets a [`DelegationHandle`] back and
//! waits on it with an explicit timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Semaphore, oneshot};
use uuid::Uuid;

use crate::core::error::{OrchestrationError, Result};
use crate::core::message::Message;

/// One deferred capability call.
pub struct UnitOfWork {
    pub id: Uuid,
    pub operator: String,
    pub capability: String,
    pub future: BoxFuture<'static, Result<Message>>,
}

impl UnitOfWork {
    pub fn new(
        operator: impl Into<String>,
        capability: impl Into<String>,
        future: BoxFuture<'static, Result<Message>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operator: operator.into(),
            capability: capability.into(),
            future,
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("operator", &self.operator)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Transport-agnostic queue that runs units of work somewhere else.
pub trait TaskQueue: Send + Sync {
    /// Accept the unit for execution. Each unit is submitted at most once.
    fn submit(&self, unit: UnitOfWork) -> Result<DelegationHandle>;
}

/// The caller's side of a delegated call. Consumed by [`get`](Self::get).
#[derive(Debug)]
pub struct DelegationHandle {
    id: Uuid,
    receiver: oneshot::Receiver<Result<Message>>,
}

/// The worker's side of a delegated call.
#[derive(Debug)]
pub struct DelegationSender {
    id: Uuid,
    sender: oneshot::Sender<Result<Message>>,
}

impl DelegationHandle {
    /// A connected sender/handle pair for queues that publish results themselves.
    pub fn channel(id: Uuid) -> (DelegationSender, DelegationHandle) {
        let (sender, receiver) = oneshot::channel();
        (DelegationSender { id, sender }, DelegationHandle { id, receiver })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the worker's result.
    ///
    /// Fails with `DelegationTimeout` when nothing arrives within `timeout` and with
    /// `Delegation` when the worker went away without answering.
    pub async fn get(self, timeout: Duration) -> Result<Message> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OrchestrationError::Delegation(format!(
                "task {} was dropped before producing a result",
                self.id
            ))),
            Err(_) => Err(OrchestrationError::DelegationTimeout {
                task_id: self.id,
                timeout,
            }),
        }
    }
}

impl DelegationSender {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publish the result. Returns `false` if the handle was already dropped.
    pub fn complete(self, result: Result<Message>) -> bool {
        self.sender.send(result).is_ok()
    }
}

/// In-process queue: every unit runs as a tokio task, at most `workers` at a time.
#[derive(Debug, Clone)]
pub struct LocalTaskQueue {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl LocalTaskQueue {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for LocalTaskQueue {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TaskQueue for LocalTaskQueue {
    fn submit(&self, unit: UnitOfWork) -> Result<DelegationHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| OrchestrationError::Delegation(format!("no async runtime: {e}")))?;

        let (sender, handle) = DelegationHandle::channel(unit.id);
        let permits = self.permits.clone();
        log::debug!(
            "Queued {}.{} as task {}",
            unit.operator,
            unit.capability,
            unit.id
        );

        runtime.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => unit.future.await,
                Err(_) => Err(OrchestrationError::Delegation("worker pool closed".into())),
            };
            if !sender.complete(result) {
                log::debug!("Result of task {} discarded, caller stopped waiting", unit.id);
            }
        });

        Ok(handle)
    }
}
