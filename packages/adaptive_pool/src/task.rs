//! Task wrapper executed by worker threads.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::future::{AbortHook, FutureCell};

/// A unit of work admitted to the pool.
///
/// Tasks are created internally by
/// [`ThreadPool::execute`][crate::ThreadPool::execute] and
/// [`ThreadPool::submit`][crate::ThreadPool::submit]; the only way one
/// surfaces to a caller is through
/// [`ThreadPool::shutdown_now`][crate::ThreadPool::shutdown_now], which
/// returns the tasks that were queued but never started. A returned task
/// can still be executed with [`run`][Self::run]. Dropping it unexecuted
/// resolves its paired future (if it has one) to cancelled, so waiters do
/// not block forever on work that will never happen.
pub struct Task {
    body: Option<Box<dyn FnOnce() + Send>>,
    abort_hook: Option<Arc<dyn AbortHook>>,
}

impl Task {
    /// Wraps a fire-and-forget closure. Panics inside the body are trapped
    /// and logged so the worker loop survives them.
    pub(crate) fn plain<F>(body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            body: Some(Box::new(move || {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                    error!(
                        panic_message = %format_panic_payload(payload.as_ref()),
                        "fire-and-forget task panicked"
                    );
                }
            })),
            abort_hook: None,
        }
    }

    /// Wraps a value-producing closure paired with a future cell. The
    /// return value or trapped panic is routed into the cell; a cell that
    /// was cancelled before execution starts skips the body entirely.
    pub(crate) fn promised<R, F>(body: F, cell: Arc<FutureCell<R>>) -> Self
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let hook: Arc<dyn AbortHook> = Arc::clone(&cell) as Arc<dyn AbortHook>;

        Self {
            body: Some(Box::new(move || {
                if cell.is_cancelled() {
                    return;
                }

                match panic::catch_unwind(AssertUnwindSafe(body)) {
                    Ok(value) => cell.complete(value),
                    Err(payload) => cell.fail(format_panic_payload(payload.as_ref())),
                }
            })),
            abort_hook: Some(hook),
        }
    }

    /// Runs the task body to completion on the calling thread.
    ///
    /// Panics inside the body never propagate out of this call: they are
    /// delivered to the paired future as a failure, or logged for
    /// fire-and-forget tasks.
    pub fn run(mut self) {
        if let Some(body) = self.body.take() {
            body();
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // Dropped without running: nobody will ever resolve the paired
        // future, so resolve it to cancelled ourselves.
        if self.body.is_some() {
            if let Some(hook) = &self.abort_hook {
                hook.abort();
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("executed", &self.body.is_none())
            .field("has_future", &self.abort_hook.is_some())
            .finish()
    }
}

/// Formats a panic payload for logging and future failure messages.
fn format_panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
