//! Per-key rate limiting with idle-limiter reclamation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::backend::{RateLimitDecision, RateLimiter};
use crate::scheduler::CleanupScheduler;

/// Default period between sweeps of empty limiters.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

type KeyExtractor<R, K> = Box<dyn Fn(&R) -> K + Send + Sync>;
type LimiterFactory<R, K> = Box<dyn Fn(&K) -> Arc<dyn RateLimiter<R>> + Send + Sync>;

/// Rate limiter that keeps one delegate limiter per key.
///
/// Delegates are created lazily by a factory the first time a key is seen.
/// A periodic sweep on the [`CleanupScheduler`] drops every delegate that
/// reports itself empty, so keys that stop sending traffic do not hold memory.
/// The next request for a reclaimed key gets a fresh delegate with no history.
pub struct KeyedRateLimiter<R: ?Sized, K> {
    /// Maps a request to its key
    key_extractor: KeyExtractor<R, K>,
    /// Creates the delegate for a new key
    factory: LimiterFactory<R, K>,
    /// Live delegates indexed by key
    limiters: DashMap<K, Arc<dyn RateLimiter<R>>>,
}

impl<R, K> KeyedRateLimiter<R, K>
where
    R: ?Sized + 'static,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Create a keyed limiter swept every [`DEFAULT_SWEEP_INTERVAL`].
    ///
    /// The factory runs while the key's map shard is locked, so it must not
    /// call back into this limiter.
    pub fn new<E, F>(key_extractor: E, factory: F, scheduler: &dyn CleanupScheduler) -> Arc<Self>
    where
        E: Fn(&R) -> K + Send + Sync + 'static,
        F: Fn(&K) -> Arc<dyn RateLimiter<R>> + Send + Sync + 'static,
    {
        Self::with_sweep_interval(key_extractor, factory, scheduler, DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a keyed limiter swept every `sweep_interval`.
    pub fn with_sweep_interval<E, F>(
        key_extractor: E,
        factory: F,
        scheduler: &dyn CleanupScheduler,
        sweep_interval: Duration,
    ) -> Arc<Self>
    where
        E: Fn(&R) -> K + Send + Sync + 'static,
        F: Fn(&K) -> Arc<dyn RateLimiter<R>> + Send + Sync + 'static,
    {
        let limiter = Arc::new(Self {
            key_extractor: Box::new(key_extractor),
            factory: Box::new(factory),
            limiters: DashMap::new(),
        });

        let this = Arc::downgrade(&limiter);
        scheduler.schedule_repeating(
            sweep_interval,
            Box::new(move || match this.upgrade() {
                Some(limiter) => {
                    limiter.sweep();
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }),
        );

        debug!(
            sweep_interval_ms = sweep_interval.as_millis() as u64,
            "Keyed rate limiter created"
        );
        limiter
    }

    /// Number of keys with a live delegate.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no key has a live delegate.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Whether `key` currently has a live delegate.
    pub fn contains_key(&self, key: &K) -> bool {
        self.limiters.contains_key(key)
    }

    /// Run `request` through the delegate for `key`, creating it on first use.
    ///
    /// The delegate decides while its map entry is still locked, so a sweep
    /// of the same key waits until the admission is recorded. Concurrent first
    /// requests for the same key create exactly one delegate.
    fn accept_keyed(&self, key: K, request: &R) -> RateLimitDecision {
        if let Some(existing) = self.limiters.get(&key) {
            return existing.accept(request);
        }

        match self.limiters.entry(key) {
            Entry::Occupied(entry) => entry.get().accept(request),
            Entry::Vacant(entry) => {
                debug!(key = ?entry.key(), "Creating new rate limiter");
                let limiter = (self.factory)(entry.key());
                let inserted = entry.insert(limiter);
                inserted.accept(request)
            }
        }
    }

    /// Drop every delegate that reports itself empty.
    ///
    /// Each key is checked and removed under its shard's write lock, which
    /// excludes a concurrent `accept` on that key. A delegate is only dropped
    /// if it was empty with no admission in flight.
    /// Returns the number of delegates removed.
    pub fn sweep(&self) -> usize {
        let keys: Vec<K> = self.limiters.iter().map(|entry| entry.key().clone()).collect();

        let mut removed = 0;
        for key in keys {
            if self
                .limiters
                .remove_if(&key, |_, limiter| limiter.is_empty())
                .is_some()
            {
                trace!(key = ?key, "Reclaimed idle rate limiter");
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, remaining = self.limiters.len(), "Swept idle rate limiters");
        }
        removed
    }
}

impl<R, K> RateLimiter<R> for KeyedRateLimiter<R, K>
where
    R: ?Sized + 'static,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    fn accept(&self, request: &R) -> RateLimitDecision {
        let key = (self.key_extractor)(request);
        self.accept_keyed(key, request)
    }

    fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
