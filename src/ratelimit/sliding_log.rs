//! Sliding-log rate limiter with deferred cleanup.
//!
//! Every admitted request appends its timestamp to the tail of a log. A request
//! is admitted while the log holds fewer entries than the rate allows. Stale
//! entries are not removed on the admission path; each admission schedules a
//! cleanup one window later on the [`CleanupScheduler`], which trims the head.
//!
//! Admission and cleanup are serialized by two independent locks, one per end
//! of the log, so a cleanup sweep never holds up admission. The log storage is
//! only locked for single O(1) operations. The one interaction between the two
//! ends is a rejection peeking at the head while a cleanup removes it; that
//! case is answered with a zero-wait rejection.
//!
//! Accuracy depends on the scheduler: if cleanups run late, stale entries are
//! still counted and requests may be rejected early, but the configured rate is
//! never exceeded.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

use super::backend::{RateLimitDecision, RateLimiter};
use super::clock::{Clock, SystemClock};
use super::rate::Rate;
use crate::scheduler::CleanupScheduler;

/// Timestamps of admitted requests, oldest first.
#[derive(Default)]
struct SlidingLog {
    entries: Mutex<VecDeque<Instant>>,
    /// Mirror of `entries.len()`, readable without the storage lock
    len: AtomicUsize,
}

impl SlidingLog {
    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    fn push_back(&self, at: Instant) {
        let mut entries = self.entries.lock();
        entries.push_back(at);
        self.len.store(entries.len(), Ordering::Release);
    }

    fn front(&self) -> Option<Instant> {
        self.entries.lock().front().copied()
    }

    /// Pop the head if `stale` holds for it.
    fn pop_front_if(&self, stale: impl FnOnce(Instant) -> bool) -> bool {
        let mut entries = self.entries.lock();
        match entries.front() {
            Some(&head) if stale(head) => {
                entries.pop_front();
                self.len.store(entries.len(), Ordering::Release);
                true
            }
            _ => false,
        }
    }
}

/// Rejection for a full log whose head was observed as `head`.
///
/// An absent head means a cleanup emptied the log between the size check and
/// the peek. Admitting here could double count, so the caller is told to retry
/// immediately instead.
fn rejection(head: Option<Instant>, now: Instant, window: Duration) -> RateLimitDecision {
    let retry_after = match head {
        Some(head) => (head + window).saturating_duration_since(now),
        None => Duration::ZERO,
    };
    RateLimitDecision::Rejected { retry_after }
}

/// Rate limiter based on the sliding log algorithm.
///
/// Admission is O(1): a size check and an append, or a size check and a peek.
/// Memory grows with the number of requests admitted per window.
///
/// Limiters are always handed out as `Arc<SlidingLogRateLimiter>`. Scheduled
/// cleanups only hold a weak reference, so dropping the last `Arc` frees the
/// log and turns any pending cleanup into a no-op.
pub struct SlidingLogRateLimiter {
    rate: Rate,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn CleanupScheduler>,
    log: SlidingLog,
    /// Serializes admission (append, size check, rejection peek)
    tail_lock: Mutex<()>,
    /// Serializes cleanup (head removal)
    head_lock: Mutex<()>,
    this: Weak<SlidingLogRateLimiter>,
    /// Runs once between the size check and the head peek of a rejection
    #[cfg(test)]
    before_peek: Mutex<Option<Box<dyn FnOnce(&SlidingLogRateLimiter) + Send>>>,
}

impl std::fmt::Debug for SlidingLogRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingLogRateLimiter")
            .field("rate", &self.rate)
            .field("len", &self.log.len())
            .finish()
    }
}

impl SlidingLogRateLimiter {
    /// Create a limiter reading time from the system clock.
    pub fn new(rate: Rate, scheduler: Arc<dyn CleanupScheduler>) -> Arc<Self> {
        Self::with_clock(rate, Arc::new(SystemClock), scheduler)
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(
        rate: Rate,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn CleanupScheduler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            rate,
            clock,
            scheduler,
            log: SlidingLog::default(),
            tail_lock: Mutex::new(()),
            head_lock: Mutex::new(()),
            this: this.clone(),
            #[cfg(test)]
            before_peek: Mutex::new(None),
        })
    }

    /// The rate this limiter enforces.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Number of entries currently counted, stale ones included.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log holds no entries.
    ///
    /// This is a snapshot read and never waits for admission in progress.
    pub fn is_empty(&self) -> bool {
        self.log.len() == 0
    }

    /// Decide whether one more request fits in the current window.
    ///
    /// Admission records the request and schedules one cleanup a window later.
    pub fn try_acquire(&self) -> RateLimitDecision {
        let decision = {
            let _tail = self.tail_lock.lock();
            let now = self.clock.now();

            if (self.log.len() as u64) < self.rate.requests() {
                self.log.push_back(now);
                RateLimitDecision::Admitted
            } else {
                #[cfg(test)]
                self.run_before_peek();
                rejection(self.log.front(), now, self.rate.window())
            }
        };

        match decision {
            RateLimitDecision::Admitted => {
                trace!(len = self.log.len(), "Accepting request");
                self.schedule_cleanup();
            }
            RateLimitDecision::Rejected { retry_after } => {
                trace!(retry_after_ms = retry_after.as_millis() as u64, "Rejecting request");
            }
        }

        decision
    }

    /// Remove every entry that has left the window.
    ///
    /// Safe to call at any time and any number of times, concurrently with
    /// admission. Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let _head = self.head_lock.lock();
        let now = self.clock.now();
        let window = self.rate.window();

        let mut removed = 0;
        while self
            .log
            .pop_front_if(|head| now.saturating_duration_since(head) >= window)
        {
            removed += 1;
        }

        if removed > 0 {
            trace!(removed, remaining = self.log.len(), "Cleaned sliding log");
        }
        removed
    }

    #[cfg(test)]
    fn run_before_peek(&self) {
        let hook = self.before_peek.lock().take();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    fn schedule_cleanup(&self) {
        let this = self.this.clone();
        self.scheduler.schedule_once(
            self.rate.window(),
            Box::new(move || {
                if let Some(limiter) = this.upgrade() {
                    limiter.cleanup();
                }
            }),
        );
    }
}

impl<R: ?Sized> RateLimiter<R> for SlidingLogRateLimiter {
    fn accept(&self, _request: &R) -> RateLimitDecision {
        self.try_acquire()
    }

    fn is_empty(&self) -> bool {
        SlidingLogRateLimiter::is_empty(self)
    }
}
