//! Convenience constructors for common limiter setups.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use super::backend::RateLimiter;
use super::clock::{Clock, SystemClock};
use super::keyed::{KeyedRateLimiter, DEFAULT_SWEEP_INTERVAL};
use super::rate::Rate;
use super::sliding_log::SlidingLogRateLimiter;
use crate::scheduler::CleanupScheduler;

/// A single sliding-log limiter with cleanups on `scheduler`.
pub fn sliding_log(rate: Rate, scheduler: Arc<dyn CleanupScheduler>) -> Arc<SlidingLogRateLimiter> {
    SlidingLogRateLimiter::new(rate, scheduler)
}

/// A keyed limiter with one sliding-log limiter per key, all at `rate`.
///
/// Every per-key limiter and the idle sweep share `scheduler`.
pub fn keyed_sliding_log<R, K, E>(
    rate: Rate,
    key_extractor: E,
    scheduler: Arc<dyn CleanupScheduler>,
) -> Arc<KeyedRateLimiter<R, K>>
where
    R: ?Sized + 'static,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    E: Fn(&R) -> K + Send + Sync + 'static,
{
    keyed_sliding_log_with(
        rate,
        Arc::new(SystemClock),
        DEFAULT_SWEEP_INTERVAL,
        key_extractor,
        scheduler,
    )
}

/// Like [`keyed_sliding_log`], with an explicit clock and sweep period.
pub fn keyed_sliding_log_with<R, K, E>(
    rate: Rate,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
    key_extractor: E,
    scheduler: Arc<dyn CleanupScheduler>,
) -> Arc<KeyedRateLimiter<R, K>>
where
    R: ?Sized + 'static,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    E: Fn(&R) -> K + Send + Sync + 'static,
{
    let delegates = scheduler.clone();
    KeyedRateLimiter::with_sweep_interval(
        key_extractor,
        move |_key: &K| {
            SlidingLogRateLimiter::with_clock(rate, clock.clone(), delegates.clone())
                as Arc<dyn RateLimiter<R>>
        },
        &*scheduler,
        sweep_interval,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ManualClock, RateLimitDecision};
    use crate::scheduler::ManualScheduler;

    #[test]
    fn test_keyed_scenario() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let rate = Rate::new(1, Duration::from_millis(10)).unwrap();

        let limiter = keyed_sliding_log_with(
            rate,
            clock.clone(),
            DEFAULT_SWEEP_INTERVAL,
            |request: &(String, u32)| request.0.clone(),
            scheduler.clone(),
        );

        assert_eq!(limiter.accept(&("a".to_string(), 1)), RateLimitDecision::Admitted);
        assert_eq!(limiter.accept(&("b".to_string(), 2)), RateLimitDecision::Admitted);
        assert!(!limiter.accept(&("a".to_string(), 3)).is_admitted());
        assert_eq!(limiter.len(), 2);

        clock.advance(Duration::from_millis(10));
        scheduler.run_due();
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_sliding_log_builder() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(ManualScheduler::new(clock));
        let rate = Rate::new(3, Duration::from_secs(1)).unwrap();

        let limiter = sliding_log(rate, scheduler.clone());
        assert_eq!(limiter.rate(), rate);
        assert!(limiter.try_acquire().is_admitted());
        assert_eq!(scheduler.pending(), 1);
    }
}
