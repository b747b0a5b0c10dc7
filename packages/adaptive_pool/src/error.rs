use thiserror::Error;

/// Why the pool refused to accept a task.
///
/// Rejection is always reported synchronously to the submitter from
/// [`ThreadPool::execute`][crate::ThreadPool::execute] and
/// [`ThreadPool::submit`][crate::ThreadPool::submit]; an admitted task is
/// never silently dropped.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Rejected {
    /// The pool has been shut down and no longer accepts new tasks.
    #[error("pool is shut down and not accepting new tasks")]
    ShutDown,

    /// Every worker slot up to the maximum is occupied and the backlog
    /// queue is full, so admitting the task would grow the pool without
    /// bound. Shedding load here is deliberate.
    #[error("pool is saturated: worker ceiling reached and the queue is full")]
    Saturated,
}

/// Why a [`TaskFuture`][crate::TaskFuture] resolved without a value.
///
/// Timeouts are not part of this taxonomy: a bounded wait that elapses
/// reports the timeout through its return value instead.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum TaskError {
    /// The task body panicked while executing. The panic payload is
    /// rendered into `message`; the worker thread that ran the task
    /// survives and keeps serving the queue.
    #[error("task panicked: {message}")]
    Panicked {
        /// Human-readable rendering of the panic payload.
        message: String,
    },

    /// The future was cancelled while the task was still pending, or the
    /// task was discarded by
    /// [`ThreadPool::shutdown_now`][crate::ThreadPool::shutdown_now]
    /// before it started executing.
    #[error("task was cancelled before it produced a value")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Rejected: Send, Sync, Debug);
    assert_impl_all!(TaskError: Send, Sync, Debug);

    #[test]
    fn rejected_messages_name_the_cause() {
        assert!(Rejected::ShutDown.to_string().contains("shut down"));
        assert!(Rejected::Saturated.to_string().contains("saturated"));
    }

    #[test]
    fn panicked_message_carries_payload() {
        let error = TaskError::Panicked {
            message: "boom".to_string(),
        };

        assert!(error.to_string().contains("boom"));
    }
}
