//! Deterministic scheduler driven by a [`ManualClock`].

use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CleanupScheduler, OnceTask, RepeatingTask};
use crate::ratelimit::{Clock, ManualClock};

struct Repeating {
    next: Instant,
    period: Duration,
    task: RepeatingTask,
}

/// A [`CleanupScheduler`] that only runs tasks when asked to.
///
/// Tasks are queued against the time of a shared [`ManualClock`]. Nothing runs
/// until [`run_due`](ManualScheduler::run_due) or
/// [`run_all`](ManualScheduler::run_all) is called, and then it runs on the
/// calling thread.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    once: Mutex<Vec<(Instant, OnceTask)>>,
    repeating: Mutex<Vec<Repeating>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .field("repeating", &self.repeating())
            .finish()
    }
}

impl ManualScheduler {
    /// Create a scheduler reading time from `clock`.
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            once: Mutex::new(Vec::new()),
            repeating: Mutex::new(Vec::new()),
        }
    }

    /// Number of queued one-shot tasks.
    pub fn pending(&self) -> usize {
        self.once.lock().len()
    }

    /// Number of registered repeating tasks.
    pub fn repeating(&self) -> usize {
        self.repeating.lock().len()
    }

    /// Run every task whose due time is at or before the clock's now.
    ///
    /// One-shot tasks run first, in due order, then repeating tasks. A repeating
    /// task runs at most once per call and is re-armed one period after now.
    /// Returns the number of tasks run.
    pub fn run_due(&self) -> usize {
        let now = self.clock.now();
        let mut ran = 0;

        loop {
            let mut due = {
                let mut once = self.once.lock();
                let (due, waiting): (Vec<_>, Vec<_>) =
                    once.drain(..).partition(|(at, _)| *at <= now);
                *once = waiting;
                due
            };
            if due.is_empty() {
                break;
            }
            due.sort_by_key(|(at, _)| *at);
            for (_, task) in due {
                task();
                ran += 1;
            }
        }

        let mut tasks = std::mem::take(&mut *self.repeating.lock());
        let mut kept = Vec::with_capacity(tasks.len());
        for mut entry in tasks.drain(..) {
            if entry.next > now {
                kept.push(entry);
                continue;
            }
            ran += 1;
            if let ControlFlow::Continue(()) = (entry.task)() {
                entry.next = now + entry.period;
                kept.push(entry);
            }
        }
        // Tasks registered while the repeating tasks ran.
        let mut repeating = self.repeating.lock();
        kept.append(&mut repeating);
        *repeating = kept;

        ran
    }

    /// Run every queued one-shot task regardless of its due time.
    ///
    /// Returns the number of tasks run.
    pub fn run_all(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.once.lock());
        tasks.sort_by_key(|(at, _)| *at);
        let ran = tasks.len();
        for (_, task) in tasks {
            task();
        }
        ran
    }
}

impl CleanupScheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: OnceTask) {
        let at = self.clock.now() + delay;
        self.once.lock().push((at, task));
    }

    fn schedule_repeating(&self, period: Duration, task: RepeatingTask) {
        let next = self.clock.now() + period;
        self.repeating.lock().push(Repeating { next, period, task });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn setup() -> (Arc<ManualClock>, ManualScheduler) {
        let clock = Arc::new(ManualClock::new());
        let scheduler = ManualScheduler::new(clock.clone());
        (clock, scheduler)
    }

    fn counting(counter: &Arc<AtomicU32>) -> OnceTask {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_once_task_waits_for_due_time() {
        let (clock, scheduler) = setup();
        let runs = Arc::new(AtomicU32::new(0));

        scheduler.schedule_once(Duration::from_millis(100), counting(&runs));
        assert_eq!(scheduler.pending(), 1);

        clock.advance(Duration::from_millis(99));
        assert_eq!(scheduler.run_due(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(scheduler.run_due(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_run_all_ignores_due_time() {
        let (_clock, scheduler) = setup();
        let runs = Arc::new(AtomicU32::new(0));

        scheduler.schedule_once(Duration::from_secs(60), counting(&runs));
        scheduler.schedule_once(Duration::from_secs(3600), counting(&runs));

        assert_eq!(scheduler.run_all(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_repeating_task_rearms_until_break() {
        let (clock, scheduler) = setup();
        let runs = Arc::new(AtomicU32::new(0));

        let counter = runs.clone();
        scheduler.schedule_repeating(
            Duration::from_millis(10),
            Box::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }),
        );

        assert_eq!(scheduler.run_due(), 0);

        clock.advance(Duration::from_millis(10));
        assert_eq!(scheduler.run_due(), 1);
        assert_eq!(scheduler.repeating(), 1);

        clock.advance(Duration::from_millis(10));
        assert_eq!(scheduler.run_due(), 1);
        assert_eq!(scheduler.repeating(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tasks_scheduled_by_tasks_are_kept() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let runs = Arc::new(AtomicU32::new(0));

        let inner = scheduler.clone();
        let counter = runs.clone();
        scheduler.schedule_once(
            Duration::ZERO,
            Box::new(move || {
                inner.schedule_once(Duration::from_millis(5), counting(&counter));
            }),
        );

        assert_eq!(scheduler.run_due(), 1);
        assert_eq!(scheduler.pending(), 1);

        clock.advance(Duration::from_millis(5));
        assert_eq!(scheduler.run_due(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
