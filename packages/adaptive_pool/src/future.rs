//! Single-assignment result cell shared between a submitter and the worker
//! that executes the paired task.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::TaskError;

/// Resolution state of a future. Leaves `Pending` at most once; every
/// later transition attempt is a no-op.
enum FutureState<T> {
    Pending,
    Completed(T),
    Failed(String),
    Cancelled,
}

impl<T> FutureState<T> {
    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed(_) => "Completed",
            Self::Failed(_) => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// The shared cell behind a [`TaskFuture`].
///
/// Owns its own lock and condition variable, distinct from the pool lock,
/// so a caller blocked on a result never holds up admission or shutdown,
/// and in-flight futures never serialize against each other.
pub(crate) struct FutureCell<T> {
    state: Mutex<FutureState<T>>,
    resolved: Condvar,
}

impl<T> FutureCell<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FutureState::Pending),
            resolved: Condvar::new(),
        })
    }

    /// Stores the task's return value and wakes all waiters.
    pub(crate) fn complete(&self, value: T) {
        let mut state = self.state.lock();

        if matches!(*state, FutureState::Pending) {
            *state = FutureState::Completed(value);
            self.resolved.notify_all();
        }
    }

    /// Records a task failure and wakes all waiters.
    pub(crate) fn fail(&self, message: String) {
        let mut state = self.state.lock();

        if matches!(*state, FutureState::Pending) {
            *state = FutureState::Failed(message);
            self.resolved.notify_all();
        }
    }

    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock();

        if matches!(*state, FutureState::Pending) {
            *state = FutureState::Cancelled;
            self.resolved.notify_all();
            true
        } else {
            false
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), FutureState::Cancelled)
    }
}

/// Type-erased cancellation hook, letting a queued task cancel its paired
/// future without knowing the result type.
pub(crate) trait AbortHook: Send + Sync {
    fn abort(&self);
}

impl<T> AbortHook for FutureCell<T>
where
    T: Send,
{
    fn abort(&self) {
        self.cancel();
    }
}

/// A handle to the not-yet-available result of a submitted task.
///
/// Returned by [`ThreadPool::submit`][crate::ThreadPool::submit]. The
/// handle is cheap to clone; all clones observe the same resolution, and
/// any number of threads may wait on it concurrently. The paired task
/// resolves the future exactly once: to `Completed` with its return value,
/// or to `Failed` if the task body panicked. Cancellation is best-effort
/// and future-scoped only; it never aborts a task that is already running.
///
/// # Example
///
/// ```rust
/// use adaptive_pool::ThreadPool;
///
/// let pool = ThreadPool::new();
///
/// let future = pool.submit(|| 21 * 2).unwrap();
/// assert_eq!(future.wait().unwrap(), 42);
/// ```
pub struct TaskFuture<T> {
    cell: Arc<FutureCell<T>>,
}

impl<T> TaskFuture<T> {
    pub(crate) fn from_cell(cell: Arc<FutureCell<T>>) -> Self {
        Self { cell }
    }

    /// Blocks the calling thread until the future resolves.
    ///
    /// Returns immediately if the future has already resolved. Waiting
    /// threads each receive a clone of the stored value, so concurrent
    /// waiters all observe the same result.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Panicked`] if the task body panicked, or
    /// [`TaskError::Cancelled`] if the future was cancelled before the
    /// task produced a value.
    pub fn wait(&self) -> Result<T, TaskError>
    where
        T: Clone,
    {
        let mut state = self.cell.state.lock();

        while matches!(*state, FutureState::Pending) {
            self.cell.resolved.wait(&mut state);
        }

        Self::resolution(&state)
    }

    /// Blocks until the future resolves or `timeout` elapses.
    ///
    /// Returns [`None`] if the timeout elapsed with the future still
    /// pending. The timeout is reported as a value, never as an error,
    /// and the future remains usable afterwards.
    ///
    /// # Errors
    ///
    /// Same as [`wait`][Self::wait] when the future resolved in time.
    pub fn wait_for(&self, timeout: Duration) -> Option<Result<T, TaskError>>
    where
        T: Clone,
    {
        // A timeout too large to express as a deadline means waiting
        // without bound.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut state = self.cell.state.lock();

        while matches!(*state, FutureState::Pending) {
            if self.cell.resolved.wait_until(&mut state, deadline).timed_out() {
                if matches!(*state, FutureState::Pending) {
                    return None;
                }
                break;
            }
        }

        Some(Self::resolution(&state))
    }

    /// Returns the resolution if the future has already resolved, without
    /// blocking.
    pub fn try_get(&self) -> Option<Result<T, TaskError>>
    where
        T: Clone,
    {
        let state = self.cell.state.lock();

        if matches!(*state, FutureState::Pending) {
            return None;
        }

        Some(Self::resolution(&state))
    }

    /// Cancels the future if it is still pending.
    ///
    /// Returns `true` only for the transition out of `Pending`; a future
    /// that already resolved (or was already cancelled) is left untouched
    /// and `false` is returned. A task that is already executing runs to
    /// completion regardless, but its result is then discarded; a task
    /// still sitting in the queue is skipped by the worker that dequeues
    /// it.
    pub fn cancel(&self) -> bool {
        self.cell.cancel()
    }

    /// Whether the future has left the pending state.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(*self.cell.state.lock(), FutureState::Pending)
    }

    /// Whether the future was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cell.is_cancelled()
    }

    fn resolution(state: &FutureState<T>) -> Result<T, TaskError>
    where
        T: Clone,
    {
        match state {
            FutureState::Pending => {
                unreachable!("resolution is only read after the state leaves Pending")
            }
            FutureState::Completed(value) => Ok(value.clone()),
            FutureState::Failed(message) => Err(TaskError::Panicked {
                message: message.clone(),
            }),
            FutureState::Cancelled => Err(TaskError::Cancelled),
        }
    }
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("state", &self.cell.state.lock().name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(TaskFuture<i32>: Send, Sync, Clone, Debug);

    fn pending_pair<T: Send>() -> (Arc<FutureCell<T>>, TaskFuture<T>) {
        let cell = FutureCell::new();
        let future = TaskFuture::from_cell(Arc::clone(&cell));
        (cell, future)
    }

    #[test]
    fn wait_returns_completed_value() {
        let (cell, future) = pending_pair();

        cell.complete(7);

        assert_eq!(future.wait(), Ok(7));
    }

    #[test]
    fn wait_blocks_until_completion() {
        let (cell, future) = pending_pair();

        let waiter = thread::spawn(move || future.wait());

        // The waiter is parked on the condvar; completing must wake it.
        cell.complete("done");

        assert_eq!(waiter.join().unwrap(), Ok("done"));
    }

    #[test]
    fn concurrent_waiters_observe_the_same_value() {
        let (cell, future) = pending_pair();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let future = future.clone();
                thread::spawn(move || future.wait())
            })
            .collect();

        cell.complete(99);

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Ok(99));
        }
        assert_eq!(future.wait(), Ok(99));
    }

    #[test]
    fn wait_reports_failure() {
        let (cell, future) = pending_pair::<i32>();

        cell.fail("boom".to_string());

        assert_eq!(
            future.wait(),
            Err(TaskError::Panicked {
                message: "boom".to_string()
            })
        );
    }

    #[test]
    fn wait_for_times_out_while_pending() {
        let (_cell, future) = pending_pair::<i32>();

        assert_eq!(future.wait_for(Duration::from_millis(20)), None);
        assert!(!future.is_resolved());
    }

    #[test]
    fn wait_for_accepts_an_effectively_unbounded_timeout() {
        let (cell, future) = pending_pair();

        let completer = thread::spawn(move || cell.complete(31));

        // Must block (not overflow) and deliver the resolution.
        assert_eq!(future.wait_for(Duration::MAX), Some(Ok(31)));
        completer.join().unwrap();
    }

    #[test]
    fn wait_for_returns_resolution_in_time() {
        let (cell, future) = pending_pair();

        cell.complete(5);

        assert_eq!(future.wait_for(Duration::from_secs(5)), Some(Ok(5)));
    }

    #[test]
    fn cancel_succeeds_only_while_pending() {
        let (_cell, future) = pending_pair::<i32>();

        assert!(future.cancel());
        assert!(!future.cancel());
        assert_eq!(future.wait(), Err(TaskError::Cancelled));
    }

    #[test]
    fn cancel_after_completion_does_not_alter_the_result() {
        let (cell, future) = pending_pair();

        cell.complete(1);

        assert!(!future.cancel());
        assert_eq!(future.try_get(), Some(Ok(1)));
    }

    #[test]
    fn completion_after_cancellation_is_ignored() {
        let (cell, future) = pending_pair();

        assert!(future.cancel());
        cell.complete(1);

        assert_eq!(future.wait(), Err(TaskError::Cancelled));
    }

    #[test]
    fn try_get_is_none_while_pending() {
        let (_cell, future) = pending_pair::<i32>();

        assert_eq!(future.try_get(), None);
    }
}
