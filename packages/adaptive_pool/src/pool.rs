//! Pool surface, admission policy, and lifecycle management.

use std::any::type_name;
use std::fmt;
use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::queue::BoundedQueue;
use crate::task::Task;
use crate::worker::Worker;
use crate::{FutureCell, Rejected, TaskFuture};

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Pool lifecycle. Transitions strictly forward: `Running` →
/// `ShuttingDown` → `Terminated`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Lifecycle {
    Running,
    ShuttingDown,
    Terminated,
}

/// Everything guarded by the pool lock: queue contents, worker-set size,
/// and lifecycle. Critical sections stay short; the lock is never held
/// while a task body executes or while blocking on a future.
pub(crate) struct PoolState {
    queue: BoundedQueue<Task>,
    lifecycle: Lifecycle,
    worker_count: usize,
    next_worker_id: usize,
}

pub(crate) struct PoolInner {
    pub(crate) core_threads: usize,
    pub(crate) max_threads: usize,
    pub(crate) keep_alive: Duration,
    pub(crate) allow_core_timeout: bool,

    state: Mutex<PoolState>,
    /// Signaled once per enqueued task; broadcast on shutdown so every
    /// parked worker observes the lifecycle change.
    work_available: Condvar,
    /// Broadcast when the last worker exits after shutdown.
    terminated: Condvar,
    /// Cooperative interruption flag set by `shutdown_now`. Checked by
    /// workers at the queue-wait suspension point; never preempts a task
    /// body that is already executing.
    interrupted: AtomicBool,
}

impl PoolInner {
    pub(crate) fn new(
        core_threads: usize,
        max_threads: usize,
        keep_alive: Duration,
        queue_capacity: usize,
        allow_core_timeout: bool,
    ) -> Self {
        Self {
            core_threads,
            max_threads,
            keep_alive,
            allow_core_timeout,
            state: Mutex::new(PoolState {
                queue: BoundedQueue::with_capacity(queue_capacity),
                lifecycle: Lifecycle::Running,
                worker_count: 0,
                next_worker_id: 0,
            }),
            work_available: Condvar::new(),
            terminated: Condvar::new(),
            interrupted: AtomicBool::new(false),
        }
    }

    /// The admission policy: core worker first, then backlog, then
    /// overflow worker, then rejection. The ordering keeps a warm core
    /// pool busy, buffers bursts in the queue, grows beyond core size only
    /// once the buffer is exhausted, and sheds load deterministically
    /// instead of growing without bound.
    pub(crate) fn admit(self: &Arc<Self>, task: Task) -> Result<(), Rejected> {
        let mut state = self.state.lock();

        if state.lifecycle != Lifecycle::Running {
            return Err(Rejected::ShutDown);
        }

        if state.worker_count < self.core_threads {
            self.spawn_worker(&mut state, true, Some(task));
            return Ok(());
        }

        match state.queue.push_back(task) {
            Ok(()) => {
                // A pool configured with zero core threads can reach this
                // point with no worker alive to drain the backlog; make
                // sure at least one exists.
                if state.worker_count == 0 {
                    self.spawn_worker(&mut state, false, None);
                }

                trace!(queued = state.queue.len(), "task enqueued");
                self.work_available.notify_one();
                Ok(())
            }
            Err(task) => {
                if state.worker_count < self.max_threads {
                    self.spawn_worker(&mut state, false, Some(task));
                    Ok(())
                } else {
                    Err(Rejected::Saturated)
                }
            }
        }
    }

    /// Spawns idle core workers up to the core size, returning how many
    /// were started.
    pub(crate) fn prestart_core_workers(self: &Arc<Self>) -> usize {
        let mut state = self.state.lock();
        let mut spawned = 0;

        while state.lifecycle == Lifecycle::Running && state.worker_count < self.core_threads {
            self.spawn_worker(&mut state, true, None);
            spawned += 1;
        }

        spawned
    }

    /// Must be called with the pool lock held; increments the worker count
    /// atomically with the admission decision that justified the spawn.
    fn spawn_worker(self: &Arc<Self>, state: &mut PoolState, is_core: bool, first_task: Option<Task>) {
        let id = state.next_worker_id;
        state.next_worker_id += 1;
        state.worker_count += 1;

        Worker::new(Arc::clone(self), id, is_core, first_task).spawn();
    }

    /// Blocking dequeue used by worker loops. Returns `None` when the
    /// worker retires: shutdown observed with the queue drained,
    /// interruption requested, or an idle keep-alive window expired for a
    /// worker subject to eviction.
    ///
    /// Retirement bookkeeping happens here, under the same lock
    /// acquisition as the decision to retire. Admission must never observe
    /// a worker that has already decided to retire: it would count on that
    /// worker to drain the queue.
    pub(crate) fn next_task(&self, is_core: bool) -> Option<Task> {
        let mut state = self.state.lock();

        loop {
            if self.interrupted.load(Ordering::Acquire) {
                self.retire(&mut state);
                return None;
            }

            if let Some(task) = state.queue.pop_front() {
                return Some(task);
            }

            if state.lifecycle != Lifecycle::Running {
                // Queue drained after shutdown: retire.
                self.retire(&mut state);
                return None;
            }

            if is_core && !self.allow_core_timeout {
                self.work_available.wait(&mut state);
            } else {
                let timed_out = self
                    .work_available
                    .wait_for(&mut state, self.keep_alive)
                    .timed_out();

                // Re-check the queue even after a timeout: a task may have
                // been enqueued in the window between wakeup and relock.
                if timed_out && state.queue.is_empty() {
                    self.retire(&mut state);
                    return None;
                }
            }
        }
    }

    /// Removes one worker from the set; the last one out after shutdown
    /// completes termination and wakes `await_termination` callers. Must
    /// be called with the pool lock held.
    fn retire(&self, state: &mut PoolState) {
        state.worker_count -= 1;

        if state.worker_count == 0 && state.lifecycle == Lifecycle::ShuttingDown {
            debug_assert!(state.queue.is_empty(), "no worker may retire leaving the queue non-empty");
            state.lifecycle = Lifecycle::Terminated;
            self.terminated.notify_all();
        }
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();

        if state.lifecycle != Lifecycle::Running {
            return;
        }

        debug!("pool shutting down");
        state.lifecycle = Lifecycle::ShuttingDown;
        self.finish_if_empty(&mut state);
        self.work_available.notify_all();
    }

    pub(crate) fn shutdown_now(&self) -> Vec<Task> {
        let mut state = self.state.lock();

        let drained = state.queue.drain_pending();

        if state.lifecycle == Lifecycle::Running {
            debug!(discarded = drained.len(), "pool shutting down immediately");
            state.lifecycle = Lifecycle::ShuttingDown;
        }

        // Request cooperative interruption before waking anyone, so every
        // woken worker observes it.
        self.interrupted.store(true, Ordering::Release);
        self.finish_if_empty(&mut state);
        self.work_available.notify_all();

        drained
    }

    fn finish_if_empty(&self, state: &mut PoolState) {
        if state.worker_count == 0 && state.lifecycle == Lifecycle::ShuttingDown {
            debug_assert!(state.queue.is_empty(), "no worker may retire leaving the queue non-empty");
            state.lifecycle = Lifecycle::Terminated;
            self.terminated.notify_all();
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.state.lock().lifecycle != Lifecycle::Running
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.state.lock().lifecycle == Lifecycle::Terminated
    }

    pub(crate) fn await_termination(&self, timeout: Duration) -> bool {
        // A timeout too large to express as a deadline means waiting
        // without bound.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_terminated();
            return true;
        };
        let mut state = self.state.lock();

        while state.lifecycle != Lifecycle::Terminated {
            if self.terminated.wait_until(&mut state, deadline).timed_out() {
                return state.lifecycle == Lifecycle::Terminated;
            }
        }

        true
    }

    /// Unbounded termination wait, used when dropping the pool.
    fn wait_terminated(&self) {
        let mut state = self.state.lock();

        while state.lifecycle != Lifecycle::Terminated {
            self.terminated.wait(&mut state);
        }
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.state.lock().worker_count
    }

    pub(crate) fn queued_task_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn queue_capacity(&self) -> usize {
        self.state.lock().queue.capacity()
    }
}

impl fmt::Debug for PoolInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct(type_name::<Self>())
            .field("core_threads", &self.core_threads)
            .field("max_threads", &self.max_threads)
            .field("keep_alive", &self.keep_alive)
            .field("lifecycle", &state.lifecycle)
            .field("worker_count", &state.worker_count)
            .field("queued", &state.queue.len())
            .finish_non_exhaustive()
    }
}

/// A bounded thread pool that grows from a core size to a maximum size
/// under load and shrinks back once idle.
///
/// Admission follows a fixed policy, decided per task under the pool lock:
///
/// 1. while fewer than `core_threads` workers exist, spawn a new core
///    worker and hand it the task directly;
/// 2. otherwise buffer the task in the bounded queue;
/// 3. if the queue is full, spawn an overflow worker (up to
///    `max_threads`) with the task;
/// 4. if the worker ceiling is also reached, reject the task.
///
/// Core workers stay alive until shutdown; overflow workers retire after
/// sitting idle for the keep-alive window. Tasks handed straight to a
/// fresh worker bypass the queue, so strict global FIFO order is not
/// guaranteed across dispatch modes — queue order itself is FIFO.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use adaptive_pool::ThreadPool;
///
/// let pool = ThreadPool::builder()
///     .core_threads(2)
///     .max_threads(4)
///     .queue_capacity(16)
///     .build();
///
/// pool.execute(|| println!("fire and forget")).unwrap();
///
/// let future = pool.submit(|| "computed".len()).unwrap();
/// assert_eq!(future.wait().unwrap(), 8);
///
/// pool.shutdown();
/// assert!(pool.await_termination(Duration::from_secs(5)));
/// ```
///
/// # Shutdown behavior
///
/// [`shutdown`][Self::shutdown] drains: already-admitted tasks run to
/// completion. [`shutdown_now`][Self::shutdown_now] additionally requests
/// cooperative interruption and returns the never-started backlog; tasks
/// already executing still finish. Dropping the pool performs a graceful
/// shutdown and blocks until every worker has retired.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Creates a pool with default settings: core size matching available
    /// parallelism, twice that as the maximum, a 30-second keep-alive and
    /// a queue capacity of 100.
    ///
    /// Use [`builder`][Self::builder] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the pool.
    #[must_use]
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    /// Submits a fire-and-forget task.
    ///
    /// The task's return value is discarded and a panic in the body is
    /// logged rather than propagated.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] if the pool is shut down or saturated; the
    /// task is not run.
    pub fn execute<F>(&self, task: F) -> Result<(), Rejected>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.admit(Task::plain(task))
    }

    /// Submits a value-producing task, returning a future for its result.
    ///
    /// The worker that executes the task resolves the future exactly once
    /// with the return value, or with a failure if the body panicked.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] if the pool is shut down or saturated; the
    /// task is not run and no future is handed out.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskFuture<R>, Rejected>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let cell = FutureCell::new();
        self.inner.admit(Task::promised(task, Arc::clone(&cell)))?;
        Ok(TaskFuture::from_cell(cell))
    }

    /// Spawns idle core workers ahead of demand, up to the core size.
    ///
    /// Returns the number of workers actually started.
    pub fn prestart_core_workers(&self) -> usize {
        self.inner.prestart_core_workers()
    }

    /// Begins a graceful shutdown. Idempotent.
    ///
    /// New submissions are rejected from this point on, but tasks already
    /// admitted — queued or executing — run to completion. Workers retire
    /// once the queue is drained.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Shuts down immediately, returning the tasks that were queued but
    /// never started.
    ///
    /// Workers parked on the queue are interrupted cooperatively and
    /// retire; a task that is already executing is not stopped
    /// mid-execution. Each returned [`Task`] can still be run by the
    /// caller; dropping one unexecuted resolves its paired future to
    /// cancelled.
    pub fn shutdown_now(&self) -> Vec<Task> {
        self.inner.shutdown_now()
    }

    /// Whether a shutdown has been initiated.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    /// Whether shutdown has completed: the pool is shut down and the last
    /// worker has exited.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    /// Blocks until the pool terminates or `timeout` elapses, returning
    /// whether termination was reached.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.inner.await_termination(timeout)
    }

    /// Number of live worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count()
    }

    /// Number of tasks currently buffered in the queue.
    #[must_use]
    pub fn queued_task_count(&self) -> usize {
        self.inner.queued_task_count()
    }

    /// The configured core pool size.
    #[must_use]
    pub fn core_threads(&self) -> usize {
        self.inner.core_threads
    }

    /// The configured worker ceiling.
    #[must_use]
    pub fn max_threads(&self) -> usize {
        self.inner.max_threads
    }

    /// The configured backlog bound.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.inner.queue_capacity()
    }

    /// The configured idle eviction window for overflow workers.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    #[cfg_attr(test, mutants::skip)] // Impractical to test that stuff stops happening.
    fn drop(&mut self) {
        if thread::panicking() {
            // If the thread is panicking, we are probably in a dirty state
            // and blocking on worker retirement may make the problem worse
            // by hiding the original panic, so just do nothing.
            return;
        }

        self.inner.shutdown();
        self.inner.wait_terminated();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("inner", &self.inner)
            .finish()
    }
}

/// Builder for configuring a [`ThreadPool`].
#[derive(Debug)]
pub struct ThreadPoolBuilder {
    core_threads: Option<usize>,
    max_threads: Option<usize>,
    keep_alive: Duration,
    queue_capacity: usize,
    allow_core_timeout: bool,
}

impl ThreadPoolBuilder {
    fn new() -> Self {
        Self {
            core_threads: None,
            max_threads: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            allow_core_timeout: false,
        }
    }

    /// Sets the warm thread floor: workers kept alive regardless of idle
    /// time (unless [`allow_core_timeout`][Self::allow_core_timeout] is
    /// enabled). May be zero, in which case every worker is subject to
    /// keep-alive eviction.
    ///
    /// Defaults to the available parallelism of the host.
    #[must_use]
    pub fn core_threads(mut self, count: usize) -> Self {
        self.core_threads = Some(count);
        self
    }

    /// Sets the hard worker ceiling. Must be at least 1 and at least the
    /// core size.
    ///
    /// Defaults to twice the core size.
    #[must_use]
    pub fn max_threads(mut self, count: usize) -> Self {
        self.max_threads = Some(count);
        self
    }

    /// Sets how long an idle overflow worker waits for work before
    /// retiring.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets the backlog bound: how many tasks may be buffered before
    /// admission starts spawning overflow workers.
    ///
    /// Defaults to 100.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Makes core workers subject to the same keep-alive eviction as
    /// overflow workers.
    ///
    /// Disabled by default.
    #[must_use]
    pub fn allow_core_timeout(mut self, allow: bool) -> Self {
        self.allow_core_timeout = allow;
        self
    }

    /// Builds the pool with the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is zero, if `core_threads` exceeds
    /// `max_threads`, or if `queue_capacity` is zero.
    #[must_use]
    pub fn build(self) -> ThreadPool {
        let core_threads = self
            .core_threads
            .unwrap_or_else(|| match self.max_threads {
                // An explicit ceiling below the host parallelism caps the
                // defaulted core size.
                Some(max) => default_parallelism().min(max),
                None => default_parallelism(),
            });
        let max_threads = self.max_threads.unwrap_or(core_threads.max(1) * 2);

        assert!(max_threads >= 1, "max_threads must be at least 1");
        assert!(
            core_threads <= max_threads,
            "core_threads ({core_threads}) must not exceed max_threads ({max_threads})"
        );
        assert!(self.queue_capacity >= 1, "queue_capacity must be at least 1");

        ThreadPool {
            inner: Arc::new(PoolInner::new(
                core_threads,
                max_threads,
                self.keep_alive,
                self.queue_capacity,
                self.allow_core_timeout,
            )),
        }
    }
}

fn default_parallelism() -> usize {
    thread::available_parallelism().map_or(1, NonZero::get)
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(ThreadPool: Send, Sync, Debug);

    #[test]
    fn builder_applies_configuration() {
        let pool = ThreadPool::builder()
            .core_threads(2)
            .max_threads(5)
            .keep_alive(Duration::from_millis(250))
            .queue_capacity(7)
            .build();

        assert_eq!(pool.core_threads(), 2);
        assert_eq!(pool.max_threads(), 5);
        assert_eq!(pool.keep_alive(), Duration::from_millis(250));
        assert_eq!(pool.queue_capacity(), 7);
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn defaulted_core_size_respects_explicit_ceiling() {
        let pool = ThreadPool::builder().max_threads(1).build();

        assert_eq!(pool.core_threads(), 1);
        assert_eq!(pool.max_threads(), 1);
    }

    #[test]
    #[should_panic(expected = "max_threads")]
    fn zero_max_threads_is_rejected() {
        drop(ThreadPool::builder().core_threads(0).max_threads(0).build());
    }

    #[test]
    #[should_panic(expected = "must not exceed")]
    fn core_above_max_is_rejected() {
        drop(ThreadPool::builder().core_threads(4).max_threads(2).build());
    }

    #[test]
    #[should_panic(expected = "queue_capacity")]
    fn zero_queue_capacity_is_rejected() {
        drop(ThreadPool::builder().queue_capacity(0).build());
    }

    #[test]
    fn submit_round_trip() {
        let pool = ThreadPool::builder().core_threads(1).max_threads(1).build();

        let future = pool.submit(|| 6 * 7).unwrap();

        assert_eq!(future.wait(), Ok(42));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let pool = ThreadPool::builder().core_threads(1).max_threads(1).build();

        pool.shutdown();
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn shutdown_of_never_used_pool_terminates_immediately() {
        let pool = ThreadPool::builder().core_threads(2).max_threads(4).build();

        assert!(!pool.is_shutdown());
        assert!(!pool.is_terminated());

        pool.shutdown();

        assert!(pool.is_shutdown());
        assert!(pool.is_terminated());
    }

    #[test]
    fn retiring_dequeue_updates_the_count_and_termination_atomically() {
        let inner = Arc::new(PoolInner::new(1, 1, Duration::from_secs(30), 4, false));

        // Stand-in for a live worker parked elsewhere; no thread is
        // spawned so the dequeue below is the only retirement path.
        inner.state.lock().worker_count = 1;

        inner.shutdown();

        // The None return must carry the full retirement bookkeeping with
        // it: once the lock is released, admission and shutdown may look
        // at the state, and neither may see a worker that already decided
        // to retire.
        assert!(inner.next_task(true).is_none());
        assert_eq!(inner.worker_count(), 0);
        assert!(inner.is_terminated());
    }

    #[test]
    fn keep_alive_eviction_is_atomic_with_the_count() {
        let inner = Arc::new(PoolInner::new(0, 1, Duration::from_millis(10), 4, false));

        inner.state.lock().worker_count = 1;

        assert!(inner.next_task(false).is_none());
        assert_eq!(inner.worker_count(), 0);
    }

    #[test]
    fn await_termination_accepts_an_effectively_unbounded_timeout() {
        let pool = ThreadPool::builder().core_threads(1).max_threads(1).build();

        pool.execute(|| {}).unwrap();
        pool.shutdown();

        // Must block (not overflow) until the worker retires.
        assert!(pool.await_termination(Duration::MAX));
    }

    #[test]
    fn prestart_spawns_exactly_core_workers() {
        let pool = ThreadPool::builder().core_threads(3).max_threads(6).build();

        assert_eq!(pool.prestart_core_workers(), 3);
        assert_eq!(pool.worker_count(), 3);
        assert_eq!(pool.queued_task_count(), 0);

        // Already at core size: nothing more to start.
        assert_eq!(pool.prestart_core_workers(), 0);
    }

    #[test]
    fn debug_output_names_the_pool() {
        let pool = ThreadPool::builder().core_threads(1).max_threads(2).build();

        let output = format!("{pool:?}");

        assert!(output.contains("ThreadPool"));
        assert!(output.contains("worker_count"));
    }
}
