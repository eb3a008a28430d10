//! Rate limiter trait shared by the sliding-log and keyed implementations.

use std::time::Duration;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request is admitted.
    Admitted,
    /// The request is rejected.
    ///
    /// A zero `retry_after` means the caller may retry immediately.
    Rejected {
        /// Minimum time to wait before a retry is expected to succeed.
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateLimitDecision::Admitted)
    }

    /// The wait hint of a rejection, `None` when admitted.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimitDecision::Admitted => None,
            RateLimitDecision::Rejected { retry_after } => Some(*retry_after),
        }
    }

    /// The wait hint in whole seconds, rounded up and never below one.
    ///
    /// Returns `None` when admitted.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(|d| {
            let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
            secs.max(1)
        })
    }
}

/// Trait for rate limiter implementations.
///
/// This trait abstracts over the plain [`SlidingLogRateLimiter`] and the
/// per-key [`KeyedRateLimiter`] so HTTP filters and hosts can work with
/// either.
///
/// [`SlidingLogRateLimiter`]: super::SlidingLogRateLimiter
/// [`KeyedRateLimiter`]: super::KeyedRateLimiter
pub trait RateLimiter<R: ?Sized>: Send + Sync {
    /// Decide whether `request` is admitted.
    fn accept(&self, request: &R) -> RateLimitDecision;

    /// Whether the limiter holds no state and can be recycled.
    fn is_empty(&self) -> bool;
}
