//! Worker thread spawn and run loop.

use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::pool::PoolInner;
use crate::task::Task;

/// A single pool thread: runs the task it was spawned with (if any), then
/// serves the backlog until retirement.
///
/// Core workers park indefinitely on the queue; overflow workers (and core
/// workers, when core timeout is allowed) give up after an idle keep-alive
/// window. The dequeue that signals retirement also removes the worker
/// from the pool's count, under one lock acquisition, so the run loop has
/// no bookkeeping of its own on the way out.
pub(crate) struct Worker {
    inner: Arc<PoolInner>,
    id: usize,
    is_core: bool,
    first_task: Option<Task>,
}

impl Worker {
    pub(crate) fn new(
        inner: Arc<PoolInner>,
        id: usize,
        is_core: bool,
        first_task: Option<Task>,
    ) -> Self {
        Self {
            inner,
            id,
            is_core,
            first_task,
        }
    }

    /// Consumes the worker and starts its thread. Callers may hold the
    /// pool lock: the new thread only takes it once it needs the queue.
    pub(crate) fn spawn(self) {
        let kind = if self.is_core { "core" } else { "overflow" };
        let name = format!("adaptive-pool-{kind}-{id}", id = self.id);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .expect("failed to spawn worker thread: thread spawning failure is not supported");

        // Retirement is tracked through the pool's worker count, not by
        // joining; the thread detaches here.
        drop(handle);
    }

    fn run(mut self) {
        debug!(worker_id = self.id, is_core = self.is_core, "worker thread started");

        if let Some(task) = self.first_task.take() {
            task.run();
        }

        while let Some(task) = self.inner.next_task(self.is_core) {
            task.run();
        }

        debug!(worker_id = self.id, is_core = self.is_core, "worker thread exiting");
    }
}
