//! Single-threaded microtask queue used to defer render flushes
//!
//! Work deferred here runs the next time the owning event loop drains the
//! queue with [`Microtasks::run_until_stalled`]. Everything spawned before the
//! drain, and everything spawned by tasks while draining, runs in that call.
//! Changes made synchronously before the drain are therefore batched into the
//! first flush that runs.

use crate::ReactiveError;
use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The queue owned by the host event loop
pub struct Microtasks {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl Microtasks {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
        }
    }

    /// A handle elements use to defer work onto this queue
    ///
    /// Safe to call from inside queued work while the queue is draining.
    pub fn spawner(&self) -> MicrotaskSpawner {
        MicrotaskSpawner {
            spawner: self.spawner.clone(),
        }
    }

    /// Run queued work until nothing is left that can make progress
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Drive `future` to completion, draining the queue as needed
    pub fn run_until<F: Future>(&self, future: F) -> F::Output {
        self.pool.borrow_mut().run_until(future)
    }
}

impl Default for Microtasks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Microtasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Microtasks").finish_non_exhaustive()
    }
}

/// Cloneable handle for deferring work onto a [`Microtasks`] queue
#[derive(Clone)]
pub struct MicrotaskSpawner {
    spawner: LocalSpawner,
}

impl MicrotaskSpawner {
    /// Run `job` on the next drain of the queue
    ///
    /// The returned task resolves with the job's result once it has run. If the
    /// task was dropped, a failure is logged instead.
    pub fn defer<F>(&self, job: F) -> Result<RenderTask, ReactiveError>
    where
        F: FnOnce() -> Result<(), ReactiveError> + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.spawner.spawn_local(async move {
            if let Err(Err(error)) = sender.send(job()) {
                log::error!("deferred render failed with nobody awaiting it: {error}");
            }
        })?;
        Ok(RenderTask::pending(receiver))
    }
}

impl std::fmt::Debug for MicrotaskSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrotaskSpawner").finish_non_exhaustive()
    }
}

/// Completion of a change request
///
/// Resolves once the render flush scheduled by the request has run, or
/// immediately when the request did not schedule one.
#[must_use = "a RenderTask carries render errors; await it or call try_take"]
pub struct RenderTask {
    inner: TaskInner,
}

enum TaskInner {
    Ready(Option<Result<(), ReactiveError>>),
    Pending(oneshot::Receiver<Result<(), ReactiveError>>),
}

impl RenderTask {
    /// A task that is already complete
    pub fn ready() -> Self {
        Self {
            inner: TaskInner::Ready(Some(Ok(()))),
        }
    }

    fn pending(receiver: oneshot::Receiver<Result<(), ReactiveError>>) -> Self {
        Self {
            inner: TaskInner::Pending(receiver),
        }
    }

    /// Whether a flush was scheduled for this request
    pub fn is_scheduled(&self) -> bool {
        matches!(self.inner, TaskInner::Pending(_))
    }

    /// Take the result if the task has completed, without blocking
    ///
    /// Returns `None` while the flush has not run yet, and after the result
    /// has already been taken.
    pub fn try_take(&mut self) -> Option<Result<(), ReactiveError>> {
        match &mut self.inner {
            TaskInner::Ready(result) => result.take(),
            TaskInner::Pending(receiver) => match receiver.try_recv() {
                Ok(result) => result,
                Err(oneshot::Canceled) => Some(Err(ReactiveError::Canceled)),
            },
        }
    }
}

impl Future for RenderTask {
    type Output = Result<(), ReactiveError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            TaskInner::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            TaskInner::Pending(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ReactiveError::Canceled)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl std::fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTask")
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}
