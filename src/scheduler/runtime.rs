//! Tokio-backed cleanup scheduler.

use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{CleanupScheduler, OnceTask, RepeatingTask};
use crate::error::{RatekeeperError, Result};

/// Prefix of the worker threads of a dedicated scheduler.
pub const CLEANUP_THREAD_PREFIX: &str = "ratekeeper-cleanup";

static CLEANUP_THREAD_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn next_cleanup_thread_name() -> String {
    let id = CLEANUP_THREAD_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{}", CLEANUP_THREAD_PREFIX, id)
}

/// A [`CleanupScheduler`] that runs tasks on a tokio runtime.
///
/// The scheduler either owns a dedicated runtime ([`TokioScheduler::dedicated`])
/// or spawns onto a runtime owned by the host ([`TokioScheduler::with_handle`]).
/// In both cases [`shutdown`](TokioScheduler::shutdown) stops every pending
/// and repeating task.
pub struct TokioScheduler {
    /// Runtime handle tasks are spawned on
    handle: Handle,
    /// Runtime owned by this scheduler, if dedicated
    runtime: Mutex<Option<Runtime>>,
    /// Flips to `true` on shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("dedicated", &self.runtime.lock().is_some())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl TokioScheduler {
    /// Create a scheduler with its own runtime of `threads` worker threads.
    ///
    /// Worker threads are named `ratekeeper-cleanup-{n}`.
    pub fn dedicated(threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name_fn(next_cleanup_thread_name)
            .enable_time()
            .build()
            .map_err(|e| RatekeeperError::Scheduler(e.to_string()))?;

        info!(threads = threads.max(1), "Started dedicated cleanup scheduler");

        let handle = runtime.handle().clone();
        Ok(Self {
            handle,
            runtime: Mutex::new(Some(runtime)),
            shutdown_tx: watch::channel(false).0,
        })
    }

    /// Create a scheduler spawning onto an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: Mutex::new(None),
            shutdown_tx: watch::channel(false).0,
        }
    }

    /// Create a scheduler on the runtime of the current task.
    ///
    /// Panics when called outside a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Whether [`shutdown`](TokioScheduler::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stop all pending and repeating tasks.
    ///
    /// A dedicated runtime is shut down in the background, so this is safe to
    /// call from async code. Calling it more than once is a no-op.
    pub fn shutdown(&self) {
        let already = self.shutdown_tx.send_replace(true);
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
        if !already {
            info!("Cleanup scheduler shut down");
        }
    }
}

impl CleanupScheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: OnceTask) {
        if self.is_shutdown() {
            debug!("Dropping cleanup task scheduled after shutdown");
            return;
        }
        let mut shutdown = self.shutdown_tx.subscribe();

        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => task(),
                _ = shutdown.wait_for(|stopped| *stopped) => {}
            }
        });
    }

    fn schedule_repeating(&self, period: Duration, mut task: RepeatingTask) {
        if self.is_shutdown() {
            debug!("Dropping repeating task scheduled after shutdown");
            return;
        }
        let mut shutdown = self.shutdown_tx.subscribe();

        self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let ControlFlow::Break(()) = task() {
                            break;
                        }
                    }
                    _ = shutdown.wait_for(|stopped| *stopped) => break,
                }
            }
        });
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
