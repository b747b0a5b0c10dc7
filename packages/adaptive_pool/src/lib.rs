//! A bounded thread pool that grows from a core size to a maximum size
//! under load and shrinks back when idle.
//!
//! The pool accepts two flavors of work: fire-and-forget closures via
//! [`ThreadPool::execute`] and value-producing closures via
//! [`ThreadPool::submit`], which hands back a [`TaskFuture`] for blocking
//! retrieval of the result.
//!
//! # Quick start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use adaptive_pool::ThreadPool;
//!
//! let pool = ThreadPool::builder()
//!     .core_threads(2)
//!     .max_threads(4)
//!     .build();
//!
//! let future = pool.submit(|| 2 + 2).unwrap();
//! assert_eq!(future.wait().unwrap(), 4);
//!
//! pool.shutdown();
//! assert!(pool.await_termination(Duration::from_secs(5)));
//! ```
//!
//! # Admission policy
//!
//! Each submitted task is admitted, in order of preference, by spawning a
//! core worker, buffering in the bounded queue, spawning an overflow
//! worker, or being rejected with [`Rejected::Saturated`]. Overflow
//! workers retire after an idle keep-alive window; core workers stay until
//! shutdown. The queue bound is what keeps memory use bounded under
//! overload — the pool sheds load instead of growing without limit.
//!
//! # Shutdown behavior
//!
//! [`ThreadPool::shutdown`] drains: everything already admitted runs to
//! completion. [`ThreadPool::shutdown_now`] returns the never-started
//! backlog as [`Task`] values and interrupts idle workers cooperatively;
//! a task that is already executing is never stopped mid-body. Dropping
//! the pool performs a graceful shutdown and waits for every worker to
//! retire.
//!
//! # Panics
//!
//! A panic inside a task body never takes down its worker thread. For
//! submitted tasks the panic is captured and delivered through the
//! future as [`TaskError::Panicked`]; for fire-and-forget tasks it is
//! logged and discarded.

mod error;
mod future;
mod pool;
mod queue;
mod task;
mod worker;

pub use error::*;
pub use future::*;
pub(crate) use future::FutureCell;
pub use pool::*;
pub use task::*;
