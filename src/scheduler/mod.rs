//! Background task scheduling for log cleanup and idle-limiter sweeps.
//!
//! Limiters never run their own threads. They hand deferred work to a
//! [`CleanupScheduler`] supplied by the host, which owns the execution context
//! and its lifecycle. If the scheduler stalls or drops a task, limiters may
//! over-reject until cleanup catches up, but they never over-admit.

mod manual;
mod runtime;

pub use self::manual::ManualScheduler;
pub use self::runtime::{TokioScheduler, CLEANUP_THREAD_PREFIX};

use std::ops::ControlFlow;
use std::time::Duration;

/// Work run once after a delay.
pub type OnceTask = Box<dyn FnOnce() + Send + 'static>;

/// Work run on a fixed period until it returns [`ControlFlow::Break`].
pub type RepeatingTask = Box<dyn FnMut() -> ControlFlow<()> + Send + 'static>;

/// Executes deferred and periodic tasks off the caller's thread.
///
/// Both methods must return without waiting for the task to run.
pub trait CleanupScheduler: Send + Sync {
    /// Run `task` once, after `delay` has elapsed.
    fn schedule_once(&self, delay: Duration, task: OnceTask);

    /// Run `task` every `period`, first after one `period` has elapsed.
    fn schedule_repeating(&self, period: Duration, task: RepeatingTask);
}
